//! Blocking terminal prompts.

use std::io::{self, BufRead, Write};

/// Ask for a bearer token on stderr/stdin. `None` on EOF or empty input.
pub async fn read_token() -> Option<String> {
    tokio::task::spawn_blocking(|| {
        let stderr = io::stderr();
        let mut err = stderr.lock();
        let _ = write!(err, "  Token: ");
        let _ = err.flush();

        let mut input = String::new();
        let stdin = io::stdin();
        match stdin.lock().read_line(&mut input) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(input.trim().to_string()).filter(|t| !t.is_empty()),
        }
    })
    .await
    .unwrap_or(None)
}
