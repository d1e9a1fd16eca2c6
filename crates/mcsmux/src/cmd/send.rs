use std::cell::RefCell;
use std::fs;
use std::rc::Rc;

use mcsmux_pdu::{ChannelDef, GLOBAL_CHANNEL_ID};
use mcsmux_session::{ChannelHandler, ChannelSender, ClientConnection, ClientState};
use mcsmux_transport::SocketTransport;

use crate::cmd::SendArgs;
use crate::exit::{session_error, transport_error, CliError, CliResult, FAILURE, SUCCESS, USAGE};
use crate::output::{print_payload, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = resolve_payload(&args)?;

    let transport = SocketTransport::connect(&args.path)
        .map_err(|err| transport_error("connect failed", err))?;
    let mut rx = transport
        .try_clone()
        .map_err(|err| transport_error("clone failed", err))?;

    let received: Rc<RefCell<Option<(u16, Vec<u8>)>>> = Rc::new(RefCell::new(None));
    let mut client = ClientConnection::new(transport);
    client.register_global(Box::new(CaptureHandler::new(Rc::clone(&received))));
    if let Some(name) = &args.channel {
        let def = ChannelDef::new(name.clone(), 0)
            .map_err(|err| CliError::new(USAGE, format!("invalid channel name: {err}")))?;
        client.register_static(def, Box::new(CaptureHandler::new(Rc::clone(&received))));
    }

    client
        .connect()
        .map_err(|err| session_error("connect failed", err))?;

    while client.state() != ClientState::Connected {
        let chunk = rx
            .recv_chunk()
            .map_err(|err| transport_error("receive failed", err))?
            .ok_or_else(|| CliError::new(FAILURE, "connection closed during negotiation"))?;
        client
            .on_data(&chunk)
            .map_err(|err| session_error("negotiation failed", err))?;
        if client.state() == ClientState::Closed {
            return Err(CliError::new(FAILURE, "connection closed during negotiation"));
        }
    }

    let channel_id = match &args.channel {
        Some(name) => client.announced_ids().first().copied().ok_or_else(|| {
            CliError::new(FAILURE, format!("server did not announce channel '{name}'"))
        })?,
        None => GLOBAL_CHANNEL_ID,
    };

    client
        .send(channel_id, &payload)
        .map_err(|err| session_error("send failed", err))?;

    if args.wait {
        loop {
            if let Some((channel_id, payload)) = received.borrow_mut().take() {
                print_payload(channel_id, &payload, format);
                break;
            }
            let chunk = rx
                .recv_chunk()
                .map_err(|err| transport_error("receive failed", err))?
                .ok_or_else(|| CliError::new(FAILURE, "connection closed while waiting"))?;
            client
                .on_data(&chunk)
                .map_err(|err| session_error("receive failed", err))?;
        }
    }

    let _ = client.disconnect();
    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        });
    }
    Ok(Vec::new())
}

struct CaptureHandler {
    received: Rc<RefCell<Option<(u16, Vec<u8>)>>>,
    channel_id: Option<u16>,
}

impl CaptureHandler {
    fn new(received: Rc<RefCell<Option<(u16, Vec<u8>)>>>) -> Self {
        Self {
            received,
            channel_id: None,
        }
    }
}

impl ChannelHandler for CaptureHandler {
    fn on_connected(&mut self, sender: ChannelSender) {
        self.channel_id = Some(sender.channel_id());
    }

    fn on_data(&mut self, payload: &[u8]) {
        *self.received.borrow_mut() = Some((self.channel_id.unwrap_or_default(), payload.to_vec()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn resolve_payload_prefers_data() {
        let args = SendArgs {
            path: PathBuf::from("/tmp/x.sock"),
            channel: None,
            data: Some("hello".into()),
            file: None,
            wait: false,
        };
        assert_eq!(resolve_payload(&args).unwrap(), b"hello".to_vec());
    }

    #[test]
    fn resolve_payload_defaults_empty() {
        let args = SendArgs {
            path: PathBuf::from("/tmp/x.sock"),
            channel: None,
            data: None,
            file: None,
            wait: false,
        };
        assert!(resolve_payload(&args).unwrap().is_empty());
    }

    #[test]
    fn resolve_payload_missing_file_errors() {
        let args = SendArgs {
            path: PathBuf::from("/tmp/x.sock"),
            channel: None,
            data: None,
            file: Some(PathBuf::from("/nonexistent/mcsmux-payload")),
            wait: false,
        };
        assert!(resolve_payload(&args).is_err());
    }
}
