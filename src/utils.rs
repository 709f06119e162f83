use crate::transport::{TargetMessage, Transport, TransportResponse, next_id};
use anyhow::{Result, anyhow};
use serde_json::{Value, json};
use std::sync::Arc;

/// Parses the JSON message carried by a `TargetMessage`, failing on CDP error replies.
pub(crate) fn serde_msg(msg: &TargetMessage) -> Result<Value> {
    let str_msg = msg.params["message"]
        .as_str()
        .ok_or_else(|| anyhow!("Invalid message format"))?;
    let value: Value = serde_json::from_str(str_msg)?;
    if let Some(err) = value.get("error") {
        let text = err["message"].as_str().unwrap_or("unknown error");
        return Err(anyhow!("CDP error {}: {text}", err["code"]));
    }
    Ok(value)
}

/// Sends a message to a target session and waits for the corresponding reply.
pub(crate) async fn send_and_get_msg(
    transport: Arc<Transport>,
    msg_id: usize,
    session_id: &str,
    msg: String,
) -> Result<TargetMessage> {
    let send_fut = transport.send(json!({
        "id": next_id(),
        "method": "Target.sendMessageToTarget",
        "params": { "sessionId": session_id, "message": msg }
    }));
    let recv_fut = transport.get_target_msg(msg_id);

    // Polled in order: the listener reaches the actor before the request does.
    let (target_msg, _) = futures_util::try_join!(recv_fut, send_fut)?;

    match target_msg {
        TransportResponse::Target(res) => Ok(res),
        other => Err(anyhow!("Unexpected response: {:?}", other)),
    }
}
