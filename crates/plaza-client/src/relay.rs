use std::io::Write;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use plaza_gateway::{EventBus, Frame, PushTransport};
use plaza_types::Topic;

/// Topic membership requests for the relay bridge, one JSON object per line
/// on stdout.
#[derive(Default)]
pub struct StdoutTransport;

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum Membership<'a> {
    Join(&'a str),
    Leave(&'a str),
}

impl StdoutTransport {
    fn emit(&self, request: Membership<'_>) {
        let Ok(line) = serde_json::to_string(&request) else {
            return;
        };
        let mut out = std::io::stdout().lock();
        if let Err(e) = writeln!(out, "{}", line).and_then(|_| out.flush()) {
            warn!("Relay bridge unreachable: {}", e);
        }
    }
}

impl PushTransport for StdoutTransport {
    fn join(&self, topic: &Topic) {
        self.emit(Membership::Join(&topic.wire_name()));
    }

    fn leave(&self, topic: &Topic) {
        self.emit(Membership::Leave(&topic.wire_name()));
    }
}

/// Feeds frames read from stdin into the bus until the bridge closes it.
pub async fn pump_stdin(bus: EventBus) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match Frame::parse(line).and_then(|frame| bus.ingest(frame)) {
            Ok(handled) => debug!("Frame handled by {} subscribers", handled),
            Err(e) => warn!("Dropping frame: {}", e),
        }
    }
    debug!("Relay bridge closed stdin");
    Ok(())
}
