use axum::{Router, routing::get, response::IntoResponse, extract::{ws::{WebSocketUpgrade, WebSocket, Message}, Query, Extension}};
use futures_util::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};
use crate::{
    command,
    controller::Controller,
    dispatch::ChatTransport,
    error::{AppErr, AppResult},
    state::Hub,
    utils::jwt,
};

#[derive(Clone)]
pub struct JwtSecret(pub String);

#[derive(Deserialize)] struct WsQuery { token:String }

pub fn router() -> Router {
    Router::new().route("/chat", get(ws_handler))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(q): Query<WsQuery>,
    Extension(secret): Extension<JwtSecret>,
    Extension(hub): Extension<Hub>,
    Extension(ctl): Extension<Arc<Controller>>,
) -> AppResult<impl IntoResponse> {
    let nick = jwt::verify(&q.token, &secret.0)
        .ok_or_else(|| AppErr::Unauthorized("bad token".into()))?;
    Ok(ws.on_upgrade(move |s| user_ws(s, nick, hub, ctl)))
}

/* ---------------- per user socket ---------------- */
async fn user_ws(sock: WebSocket, nick: String, hub: Hub, ctl: Arc<Controller>) {
    let (mut sink, mut stream) = sock.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let id = hub.join(&nick, tx).await;
    info!("{nick} connected");

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text(frame)).await.is_err() { break; }
        }
    });

    // one message at a time per socket, so replies keep request order
    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(raw) => command::route(&ctl, &nick, &message_text(&raw)).await,
            Message::Close(_)  => break,
            _ => {}
        }
    }

    hub.leave(&nick, id).await;
    writer.abort();
    info!("{nick} disconnected");
}

/// Accepts `{"text": "..."}` or a bare string.
fn message_text(raw: &str) -> String {
    serde_json::from_str::<Value>(raw).ok()
        .and_then(|v| v.get("text").and_then(Value::as_str).map(str::to_owned))
        .unwrap_or_else(|| raw.to_string())
}

fn pm_frame(from: &str, text: &str) -> String {
    json!({"type":"pm","from":from,"text":text}).to_string()
}

/* ---------------- hub as the bot's chat transport ---------------- */
pub struct HubTransport {
    hub:      Hub,
    bot_nick: String,
}

impl HubTransport {
    pub fn new(hub: Hub, bot_nick: &str) -> Self {
        Self { hub, bot_nick: bot_nick.to_string() }
    }
}

#[async_trait::async_trait]
impl ChatTransport for HubTransport {
    async fn send_private(&self, nick: &str, text: &str) -> AppResult<()> {
        if !self.hub.deliver(nick, pm_frame(&self.bot_nick, text)).await {
            return Err(AppErr::Upstream(format!("{nick} has no open socket")));
        }
        debug!("pm → {nick}");
        Ok(())
    }

    async fn is_present(&self, nick: &str) -> bool {
        self.hub.is_online(nick).await
    }
}
