use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mcsmux_session::{ChannelHandler, ChannelSender, ServerConnection, ServerState};
use mcsmux_transport::UnixDomainSocket;

use crate::cmd::ListenArgs;
use crate::exit::{session_error, transport_error, CliError, CliResult, SUCCESS};
use crate::output::{print_payload, OutputFormat};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let listener =
        UnixDomainSocket::bind(&args.path).map_err(|err| transport_error("bind failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    while running.load(Ordering::SeqCst) {
        let transport = match listener.accept() {
            Ok(transport) => transport,
            Err(err) => return Err(transport_error("accept failed", err)),
        };
        let mut rx = transport
            .try_clone()
            .map_err(|err| transport_error("clone failed", err))?;

        let printed = Rc::new(Cell::new(0usize));
        let mut server = ServerConnection::new(transport);
        server.register_global(Box::new(PrintHandler::new(format, Rc::clone(&printed))));
        if let Some(channels) = &args.channels {
            for name in channels {
                server.register_static(
                    name.clone(),
                    Box::new(PrintHandler::new(format, Rc::clone(&printed))),
                );
            }
        }

        while running.load(Ordering::SeqCst) {
            let chunk = match rx.recv_chunk() {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(err) => return Err(transport_error("receive failed", err)),
            };

            if let Err(err) = server.on_data(&chunk) {
                return Err(session_error("session failed", err));
            }
            if server.state() == ServerState::Closed {
                break;
            }

            if let Some(count) = args.count {
                if printed.get() >= count {
                    return Ok(SUCCESS);
                }
            }
        }
    }

    Ok(SUCCESS)
}

struct PrintHandler {
    format: OutputFormat,
    printed: Rc<Cell<usize>>,
    channel_id: Option<u16>,
}

impl PrintHandler {
    fn new(format: OutputFormat, printed: Rc<Cell<usize>>) -> Self {
        Self {
            format,
            printed,
            channel_id: None,
        }
    }
}

impl ChannelHandler for PrintHandler {
    fn on_connected(&mut self, sender: ChannelSender) {
        self.channel_id = Some(sender.channel_id());
    }

    fn on_data(&mut self, payload: &[u8]) {
        print_payload(self.channel_id.unwrap_or_default(), payload, self.format);
        self.printed.set(self.printed.get().saturating_add(1));
    }
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
