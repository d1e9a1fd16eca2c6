use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use mcsmux_pdu::GLOBAL_CHANNEL_ID;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    channel_id: u16,
    channel_label: &'a str,
    payload_size: usize,
    payload: String,
}

pub fn print_payload(channel_id: u16, payload: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = FrameOutput {
                channel_id,
                channel_label: channel_label(channel_id),
                payload_size: payload.len(),
                payload: payload_preview(payload),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Pretty => {
            println!(
                "channel={} ({}) size={} payload={}",
                channel_id,
                channel_label(channel_id),
                payload.len(),
                payload_preview(payload)
            );
        }
        OutputFormat::Raw => {
            print_raw(payload);
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn channel_label(channel_id: u16) -> &'static str {
    if channel_id == GLOBAL_CHANNEL_ID {
        "GLOBAL"
    } else if channel_id > GLOBAL_CHANNEL_ID {
        "STATIC"
    } else {
        "USER"
    }
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}
