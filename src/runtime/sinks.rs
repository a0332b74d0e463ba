use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tracing::{error, info, warn};

use crate::error::SourceError;
use crate::event::{Toast, ToastKind, ViewCommand};
use crate::model::OutboundMessage;

/// Transport side for fire-and-forget control messages.
pub trait Outbound: Send {
    fn send_raw(&mut self, message: &OutboundMessage) -> io::Result<()>;
}

/// View collaborator: dialog display, notifications, re-authentication.
pub trait Presenter: Send {
    fn view(&mut self, command: &ViewCommand);

    fn toast(&mut self, toast: &Toast);

    fn reauth_required(&mut self);
}

/// Keeps every sent message in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingOutbound {
    pub sent: Vec<OutboundMessage>,
}

impl Outbound for RecordingOutbound {
    fn send_raw(&mut self, message: &OutboundMessage) -> io::Result<()> {
        self.sent.push(message.clone());
        Ok(())
    }
}

/// Appends each sent message as one JSON line.
#[derive(Debug)]
pub struct JsonlOutbox {
    writer: BufWriter<File>,
    written: usize,
}

impl JsonlOutbox {
    pub fn create(path: &Path) -> Result<Self, SourceError> {
        let file = File::create(path).map_err(|source| SourceError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self {
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    pub fn written(&self) -> usize {
        self.written
    }
}

impl Outbound for JsonlOutbox {
    fn send_raw(&mut self, message: &OutboundMessage) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, message).map_err(io::Error::other)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.written += 1;
        Ok(())
    }
}

/// Keeps every view command, toast, and re-auth request in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingPresenter {
    pub views: Vec<ViewCommand>,
    pub toasts: Vec<Toast>,
    pub reauth_requests: usize,
}

impl Presenter for RecordingPresenter {
    fn view(&mut self, command: &ViewCommand) {
        self.views.push(command.clone());
    }

    fn toast(&mut self, toast: &Toast) {
        self.toasts.push(toast.clone());
    }

    fn reauth_required(&mut self) {
        self.reauth_requests += 1;
    }
}

/// Headless presenter reporting through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPresenter;

impl Presenter for LogPresenter {
    fn view(&mut self, command: &ViewCommand) {
        info!(command = ?command, "view");
    }

    fn toast(&mut self, toast: &Toast) {
        match toast.kind {
            ToastKind::Error => error!(message = %toast.message, "toast"),
            ToastKind::Warning => warn!(message = %toast.message, "toast"),
            ToastKind::Info => info!(message = %toast.message, "toast"),
        }
    }

    fn reauth_required(&mut self) {
        warn!("authentication required; supply a token and restart");
    }
}
