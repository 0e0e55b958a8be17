mod backup;
mod catalog;
mod config;
mod db;
mod editor;
mod exchange;
mod generator;
mod ipc;
mod logging;
mod model;

use std::io::{self, BufRead, Write};
use tracing::{info, warn};

fn main() {
    logging::init();
    info!(version = env!("CARGO_PKG_VERSION"), "curriculumd started");

    let mut state = ipc::AppState {
        workspace: None,
        db: None,
        session: ipc::Session::default(),
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id; answer with an empty one.
                warn!(error = %e, "unparseable request line");
                let _ = writeln!(stdout, "{}", ipc::err("", "bad_json", e.to_string(), None));
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }

    info!("stdin closed; shutting down");
}
