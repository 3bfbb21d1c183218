//! Request coordinator
//!
//! Drives one connection from accept to teardown:
//!
//! ```text
//! Validating → Registering → (Creating | Joining) → Resolving
//!            → (BridgingRelay) → Streaming → Draining → Closed
//! ```
//!
//! Every exit path runs the teardown: detach from the registry, and if this
//! was the last client, destroy the engine session — after the configured
//! grace period on clean exits (a reconnect inside the window cancels the
//! destruction), immediately on error exits.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};

use crate::engine::{EngineError, EngineSession, StartRequest};
use crate::error::{GatewayError, Result};
use crate::http::{response, ClientConnection, RequestHead};
use crate::registry::{AttachRole, SessionHandoff};
use crate::server::context::GatewayContext;
use crate::session::state::ConnectionState;
use crate::session::{hang, pump, StreamRequest};

/// Content type sent on the health-check and fake-header shortcuts
const FAKE_CONTENT_TYPE: &str = "video/mpeg";

/// Input prefix forcing the relay through its ffmpeg demuxer
const FORCE_DEMUX_PREFIX: &str = "http/ffmpeg://";

/// Client headers not forwarded to the origin
const UNFORWARDED_HEADERS: [&str; 5] = [
    "host",
    "connection",
    "keep-alive",
    "accept-encoding",
    "content-length",
];

/// Handle one accepted connection end to end
pub async fn handle_connection(
    ctx: Arc<GatewayContext>,
    socket: TcpStream,
    peer: SocketAddr,
    session_id: u64,
) {
    let mut client = ClientConnection::new(socket, peer);

    // Validating: request head
    let head = match timeout(ctx.config.head_timeout, client.read_head()).await {
        Ok(Ok(head)) => head,
        Ok(Err(e)) => {
            tracing::debug!(session_id, error = %e, "unreadable request head");
            client.write_error(e.status()).await;
            return;
        }
        Err(_) => {
            tracing::debug!(session_id, "request head timed out");
            return;
        }
    };

    tracing::info!(session_id, peer = %peer, path = %head.target, "accepted connection");

    // Plugin prefixes take the request whole, before any other validation.
    if let Some(token) = head.path_token() {
        if let Some(plugin) = ctx.plugins.get(&token) {
            if let Err(e) = plugin.handle(&head, &mut client).await {
                tracing::error!(session_id, token = %token, error = %e, "plugin failed");
                client.write_error(500).await;
            }
            return;
        }
    }

    if head.method != "GET" {
        client.write_error(400).await;
        return;
    }

    let request = match StreamRequest::parse(&head.target) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(session_id, error = %e, "rejected request");
            client.write_error(e.status()).await;
            return;
        }
    };

    let ceiling = ctx.config.max_connections;
    if ceiling > 0 && ctx.connections.active() > ceiling {
        tracing::warn!(session_id, active = ctx.connections.active(), "connection ceiling reached");
        client.write_error(GatewayError::CapacityExceeded.status()).await;
        return;
    }

    // Health-check bypass: pretend everything is fine and hang up.
    if let Some(ua) = head.user_agent() {
        if ctx.config.fake_user_agents.iter().any(|fake| fake == ua) {
            tracing::debug!(session_id, user_agent = %ua, "health-check bypass");
            if let Err(e) = write_fake_head(&mut client).await {
                tracing::debug!(session_id, error = %e, "bypass response not delivered");
            }
            return;
        }
    }

    let mut state = ConnectionState::new(session_id, peer, request);

    // Registering
    let attachment = ctx
        .registry
        .attach(&state.request.content_key, peer.ip())
        .await;

    // Without the relay there is no fan-out: one direct consumer per key.
    if ctx.relay.is_none() && attachment.count != 1 {
        tracing::warn!(
            session_id,
            key = %state.request.content_key,
            "stream already has a direct consumer"
        );
        client.write_error(GatewayError::StreamBusy.status()).await;
        // Full teardown, not a bare detach: if the first consumer left in
        // the meantime this attachment may be the last one out.
        teardown(&ctx, &state, None).await;
        return;
    }

    let mut session: Option<Arc<dyn EngineSession>> = None;
    let result = serve(&ctx, &mut state, &mut session, attachment.role, &head, &mut client).await;

    if let Err(e) = result {
        state.error_occurred = true;
        tracing::error!(session_id, error = %e, "request failed");
        if state.flags.connected() && !state.flags.headers_sent() {
            client.write_error(e.status()).await;
        }
    }

    // Draining / Closed
    teardown(&ctx, &state, session).await;
    tracing::debug!(session_id, "request finished");
}

/// Creating/Joining through Streaming; teardown stays with the caller
async fn serve(
    ctx: &Arc<GatewayContext>,
    state: &mut ConnectionState,
    session_slot: &mut Option<Arc<dyn EngineSession>>,
    role: AttachRole,
    head: &RequestHead,
    client: &mut ClientConnection,
) -> Result<()> {
    let key = state.request.content_key.clone();
    let creator = matches!(role, AttachRole::Creator);

    // Fake-header clients get their 200 now and never see origin headers.
    if let Some(ua) = head.user_agent() {
        if ctx.config.fake_header_user_agents.iter().any(|fake| fake == ua) {
            tracing::debug!(session_id = state.session_id, user_agent = %ua, "sending fabricated headers");
            write_fake_head(client).await?;
            state.flags.mark_headers_sent();
        }
    }

    // Creating | Joining
    let session = match role {
        AttachRole::Creator => match create_session(ctx, &state.request).await {
            Ok(session) => {
                ctx.registry.set_session(&key, Arc::clone(&session)).await;
                session
            }
            Err(e) => {
                // Release the creator slot so waiting joiners fail fast and
                // the next attacher can retry from scratch.
                ctx.registry.fail_pending(&key).await;
                return Err(e);
            }
        },
        AttachRole::Joiner(rx) => await_handoff(rx, ctx.config.engine.result_timeout).await?,
    };
    *session_slot = Some(Arc::clone(&session));

    // Resolving
    let url = session.stream_url(ctx.config.engine.stream_timeout).await?;
    // The engine answers with a loopback URL; rewrite for remote engines.
    let url = url.replace("127.0.0.1", &ctx.config.engine.host);
    tracing::debug!(session_id = state.session_id, url = %url, "stream url resolved");
    state.resolved_url = Some(url.clone());
    state.error_occurred = false;

    // BridgingRelay
    let mut stream_url = url;
    if let Some(relay) = &ctx.relay {
        if creator {
            sleep(ctx.config.pre_roll).await;
            let input = if ctx.config.relay.force_demux {
                format!("{FORCE_DEMUX_PREFIX}{stream_url}")
            } else {
                stream_url.clone()
            };
            relay
                .start_broadcast(
                    &state.request.broadcast_id,
                    &input,
                    &ctx.config.relay.mux,
                    ctx.config.relay.pre_access.as_deref(),
                )
                .await?;
            // The relay needs a moment to open its listening port.
            sleep(ctx.config.relay_settle).await;
        }
        stream_url = relay.published_url(&state.request.broadcast_id);
    }

    // Streaming: open the origin with the client's own headers.
    let mut origin_request = ctx.http.get(&stream_url);
    for (name, value) in &head.headers {
        if !UNFORWARDED_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h)) {
            origin_request = origin_request.header(name.as_str(), value.as_str());
        }
    }
    let origin = origin_request.send().await.map_err(GatewayError::Origin)?;

    if !state.flags.headers_sent() {
        let mut headers = Vec::new();
        for (name, value) in origin.headers() {
            if response::is_stripped(name.as_str()) {
                continue;
            }
            if let Ok(value) = value.to_str() {
                headers.push((name.as_str().to_string(), value.to_string()));
            }
        }
        client.write_head(origin.status().as_u16(), &headers).await?;
        state.flags.mark_headers_sent();
        tracing::debug!(session_id = state.session_id, "origin headers relayed");
    }

    if ctx.relay.is_none() {
        sleep(ctx.config.pre_roll).await;
    }

    let (reader, writer) = client
        .split_for_stream()
        .ok_or_else(|| GatewayError::Internal("client stream already split".into()))?;

    let gate = if ctx.config.playback_obey {
        Some(match &ctx.relay {
            None => pump::PlaybackGate::direct(Arc::clone(&session)),
            Some(relay) => pump::PlaybackGate::relayed(
                Arc::clone(&session),
                Arc::clone(relay),
                state.request.broadcast_id.clone(),
            ),
        })
    } else {
        None
    };

    let mut pump_task = tokio::spawn(pump::run(pump::StreamPump {
        origin,
        writer,
        flags: Arc::clone(&state.flags),
        gate,
    }));
    let mut hang_task = tokio::spawn(hang::run(reader, Arc::clone(&state.flags)));

    // Whichever finishes first wins; aborting the other (or an already
    // finished task) is a no-op signal.
    tokio::select! {
        _ = &mut pump_task => {}
        _ = &mut hang_task => {}
    }
    pump_task.abort();
    hang_task.abort();

    tracing::debug!(session_id = state.session_id, "stream tasks joined");
    Ok(())
}

/// Open and start a fresh engine session
async fn create_session(
    ctx: &Arc<GatewayContext>,
    request: &StreamRequest,
) -> Result<Arc<dyn EngineSession>> {
    let session = ctx.engine.open_session().await?;
    if let Err(e) = session.start(&StartRequest::for_stream(request)).await {
        session.destroy().await;
        return Err(e.into());
    }
    Ok(session)
}

/// Wait for the creator to publish the shared session
async fn await_handoff(
    mut rx: watch::Receiver<SessionHandoff>,
    wait: Duration,
) -> Result<Arc<dyn EngineSession>> {
    timeout(wait, async move {
        loop {
            let current = rx.borrow_and_update().clone();
            match current {
                SessionHandoff::Ready(session) => return Ok(session),
                SessionHandoff::Failed => {
                    return Err(GatewayError::Engine(EngineError::Remote(
                        "session creation failed".into(),
                    )))
                }
                SessionHandoff::Pending => {}
            }
            rx.changed()
                .await
                .map_err(|_| GatewayError::Engine(EngineError::Closed))?;
        }
    })
    .await
    .map_err(|_| GatewayError::Engine(EngineError::Timeout))?
}

/// Detach, honor the grace period, destroy when last out
///
/// Only the client whose detach emptied the key proceeds past the detach —
/// everyone else leaves the session to the remaining attachments.
async fn teardown(
    ctx: &Arc<GatewayContext>,
    state: &ConnectionState,
    session: Option<Arc<dyn EngineSession>>,
) {
    let key = &state.request.content_key;
    let remaining = ctx.registry.detach(key, state.peer.ip()).await;
    if remaining > 0 {
        return;
    }

    if !state.error_occurred {
        tracing::debug!(
            session_id = state.session_id,
            grace_ms = ctx.config.destroy_grace.as_millis() as u64,
            "last client left, waiting out the grace period"
        );
        sleep(ctx.config.destroy_grace).await;
    }

    // Re-check: a reconnect during the sleep keeps the session alive.
    if ctx.registry.peek_count(key).await > 0 {
        return;
    }

    if let Some(relay) = &ctx.relay {
        if let Err(e) = relay.stop_broadcast(&state.request.broadcast_id).await {
            tracing::debug!(
                broadcast = %state.request.broadcast_id,
                error = %e,
                "broadcast stop failed"
            );
        }
    }

    let victim = match session {
        Some(session) => Some(session),
        None => ctx.registry.session(key).await,
    };
    if let Some(victim) = victim {
        victim.destroy().await;
        tracing::info!(session_id = state.session_id, key = %key, "engine session destroyed");
    }
    ctx.registry.clear_session(key).await;
}

async fn write_fake_head(client: &mut ClientConnection) -> Result<()> {
    client
        .write_head(
            200,
            &[("Content-Type".to_string(), FAKE_CONTENT_TYPE.to_string())],
        )
        .await
}
