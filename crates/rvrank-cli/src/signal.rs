//! Terminal-driven credential refresh.
//!
//! The operator solves the site's challenge in a normal browser, copies the
//! request's `cookie` header from the developer tools, and pastes it here.

use std::time::Duration;

use rvrank_engagement::{RefreshSignal, SignalError};
use tokio::io::{AsyncBufReadExt, BufReader};

pub(crate) struct TerminalRefreshSignal {
    site_url: String,
}

impl TerminalRefreshSignal {
    pub(crate) fn new(site_url: &str) -> Self {
        Self {
            site_url: site_url.trim_end_matches('/').to_owned(),
        }
    }

    fn open_browser(&self) {
        let mut command = if cfg!(target_os = "macos") {
            let mut c = std::process::Command::new("open");
            c.arg(&self.site_url);
            c
        } else if cfg!(target_os = "windows") {
            let mut c = std::process::Command::new("cmd");
            c.args(["/C", "start", "", self.site_url.as_str()]);
            c
        } else {
            let mut c = std::process::Command::new("xdg-open");
            c.arg(&self.site_url);
            c
        };
        if let Err(e) = command
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
        {
            tracing::debug!(error = %e, "could not open browser");
        }
    }
}

impl RefreshSignal for TerminalRefreshSignal {
    async fn wait_for_signal(&self, timeout: Duration) -> Result<String, SignalError> {
        eprintln!();
        eprintln!("The stats session cookie needs to be refreshed.");
        eprintln!("  1. Open {} in your browser and browse a listing.", self.site_url);
        eprintln!("  2. In the developer tools, copy the `cookie` request header of any");
        eprintln!("     request to the site.");
        eprintln!(
            "  3. Paste it below and press Enter (empty line aborts, {} min limit).",
            timeout.as_secs() / 60
        );
        self.open_browser();

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let line = match tokio::time::timeout(timeout, lines.next_line()).await {
            Err(_) => return Err(SignalError::TimedOut),
            Ok(Err(e)) => return Err(SignalError::Capture(e.to_string())),
            Ok(Ok(None)) => return Err(SignalError::Capture("stdin closed".to_owned())),
            Ok(Ok(Some(line))) => line,
        };

        let cookie = strip_header_name(&line);
        if cookie.is_empty() {
            return Err(SignalError::Aborted);
        }
        Ok(cookie.to_owned())
    }
}

/// Accepts either the bare header value or a pasted `cookie: ...` line.
pub(crate) fn strip_header_name(line: &str) -> &str {
    let line = line.trim();
    match line.split_once(':') {
        Some((name, value)) if name.trim().eq_ignore_ascii_case("cookie") => value.trim(),
        _ => line,
    }
}
