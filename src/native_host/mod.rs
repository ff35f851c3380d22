//! Chrome native messaging host.
//!
//! Each message is a 4-byte little-endian length followed by that many bytes
//! of JSON. The host only ever answers requests. It never writes an
//! unsolicited frame, so rule changes made by the change listener or the
//! schedule ticker reach the extension the next time it sends `getRules`.

use crate::constants::MAX_MESSAGE_SIZE;
use crate::models::{BlockingRule, PartialSettings};
use crate::store::SettingsStore;
use crate::sync::{RuleSynchronizer, Status};
use crate::validation::validate_settings;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug, Deserialize)]
#[serde(tag = "action")]
pub enum IncomingMessage {
    #[serde(rename = "updateBlocking")]
    UpdateBlocking,
    #[serde(rename = "getStatus")]
    GetStatus,
    #[serde(rename = "saveSettings")]
    SaveSettings { settings: PartialSettings },
    #[serde(rename = "getRules")]
    GetRules,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutgoingMessage {
    Result {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Status(Status),
    Rules { rules: Vec<BlockingRule> },
}

impl OutgoingMessage {
    pub fn success() -> Self {
        OutgoingMessage::Result {
            success: true,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        OutgoingMessage::Result {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Read one length-prefixed frame. `None` on a clean EOF between frames.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    // Chrome Native Messaging protocol specifies little-endian byte order
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = usize::try_from(u32::from_le_bytes(len_bytes))
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if len > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Message too large: {len} bytes (max: {MAX_MESSAGE_SIZE} bytes)"),
        ));
    }

    let mut buffer = vec![0u8; len];
    reader.read_exact(&mut buffer).await?;
    Ok(Some(buffer))
}

pub async fn write_frame<W: AsyncWrite + Unpin, T: Serialize>(writer: &mut W, message: &T) -> io::Result<()> {
    let json = serde_json::to_vec(message)?;
    if json.len() > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Response too large: {} bytes (max: {MAX_MESSAGE_SIZE} bytes)", json.len()),
        ));
    }
    let len = u32::try_from(json.len()).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(&json).await?;
    writer.flush().await?;

    Ok(())
}

/// Serves the extension's requests over native messaging framing.
pub struct NativeHost {
    synchronizer: Arc<RuleSynchronizer>,
    store: Arc<dyn SettingsStore>,
}

impl NativeHost {
    pub fn new(synchronizer: Arc<RuleSynchronizer>, store: Arc<dyn SettingsStore>) -> Self {
        Self { synchronizer, store }
    }

    /// Handle requests one at a time until the reader reaches EOF.
    pub async fn run<R, W>(&self, mut reader: R, mut writer: W) -> io::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        while let Some(frame) = read_frame(&mut reader).await? {
            let response = match serde_json::from_slice::<IncomingMessage>(&frame) {
                Ok(message) => self.handle_message(message).await,
                Err(e) => {
                    warn!("Ignoring malformed message: {e}");
                    OutgoingMessage::failure(format!("Invalid message: {e}"))
                }
            };
            write_frame(&mut writer, &response).await?;
        }
        debug!("Native messaging connection closed");
        Ok(())
    }

    pub async fn handle_message(&self, message: IncomingMessage) -> OutgoingMessage {
        match message {
            IncomingMessage::UpdateBlocking => self.update_blocking().await,
            IncomingMessage::GetStatus => self.get_status().await,
            IncomingMessage::SaveSettings { settings } => self.save_settings(settings).await,
            IncomingMessage::GetRules => self.get_rules().await,
        }
    }

    async fn update_blocking(&self) -> OutgoingMessage {
        match self.synchronizer.reconcile().await {
            Ok(_) => OutgoingMessage::success(),
            Err(e) => OutgoingMessage::failure(e.to_string()),
        }
    }

    async fn get_status(&self) -> OutgoingMessage {
        match self.synchronizer.status().await {
            Ok(status) => OutgoingMessage::Status(status),
            Err(e) => OutgoingMessage::failure(e.to_string()),
        }
    }

    /// Validated write; the store's change notification drives reconciliation.
    async fn save_settings(&self, settings: PartialSettings) -> OutgoingMessage {
        if let Err(e) = validate_settings(&settings) {
            return OutgoingMessage::failure(e);
        }
        match self.store.set(settings).await {
            Ok(()) => OutgoingMessage::success(),
            Err(e) => OutgoingMessage::failure(e.to_string()),
        }
    }

    async fn get_rules(&self) -> OutgoingMessage {
        match self.synchronizer.installed_rules().await {
            Ok(rules) => OutgoingMessage::Rules { rules },
            Err(e) => OutgoingMessage::failure(e.to_string()),
        }
    }
}
