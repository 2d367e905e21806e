use crate::protocol::{Envelope, MessageKind};

/// Log line marking a completed install.
///
/// Sentinel matching is substring-based and case-sensitive: these phrases
/// are a fixed, versioned contract with the agent's installer output, not
/// a heuristic.
pub const SUCCESS_SENTINEL: &str = "Installation complete";

/// Log lines marking a failed install (download, install, and workspace
/// creation failures).
pub const FAILURE_SENTINELS: &[&str] = &[
    "Failed to download jar",
    "Failed to install",
    "Failed to create",
];

/// Progress of the current install attempt, driven entirely by observed
/// log traffic — the agent has no dedicated completion message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum InstallPhase {
    #[default]
    Idle,
    Requested,
    InProgress(String),
    Succeeded,
    Failed(String),
}

impl InstallPhase {
    /// Terminal phases stay put until a new install is requested.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_))
    }
}

impl std::fmt::Display for InstallPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Requested => write!(f, "REQUESTED"),
            Self::InProgress(msg) => write!(f, "IN_PROGRESS: {msg}"),
            Self::Succeeded => write!(f, "SUCCEEDED"),
            Self::Failed(reason) => write!(f, "FAILED: {reason}"),
        }
    }
}

/// Sentinel-scanning install state machine, one per agent.
#[derive(Debug, Clone, Default)]
pub struct InstallTracker {
    phase: InstallPhase,
}

impl InstallTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new install was requested. Any previous attempt, including a stale
    /// terminal outcome, is discarded.
    pub fn request(&mut self) {
        self.phase = InstallPhase::Requested;
    }

    pub fn phase(&self) -> &InstallPhase {
        &self.phase
    }

    /// Whether the tracker is consuming log traffic (an install has been
    /// requested and has not reached a terminal phase).
    pub fn is_watching(&self) -> bool {
        matches!(self.phase, InstallPhase::Requested | InstallPhase::InProgress(_))
    }

    /// Scan a batch of newly arrived envelopes.
    ///
    /// Scans newest-first and acts on the first LOG or RAW entry: only the
    /// newest relevant line drives a transition, so stale buffered lines
    /// cannot override fresher ones. Returns the new phase when it changed.
    pub fn observe_batch(&mut self, batch: &[Envelope]) -> Option<InstallPhase> {
        if !self.is_watching() {
            return None;
        }
        let line = batch.iter().rev().find_map(install_text)?;
        let next = classify_line(line);
        if next == self.phase {
            return None;
        }
        self.phase = next.clone();
        Some(next)
    }
}

/// The text the scanner reads from an envelope: LOG lines and preserved
/// RAW frames participate, everything else is invisible to the tracker.
fn install_text(env: &Envelope) -> Option<&str> {
    match env.kind() {
        MessageKind::Log => Some(env.log_line().unwrap_or("")),
        MessageKind::Raw => Some(env.raw.as_deref().unwrap_or("")),
        _ => None,
    }
}

fn classify_line(line: &str) -> InstallPhase {
    if line.contains(SUCCESS_SENTINEL) {
        return InstallPhase::Succeeded;
    }
    if FAILURE_SENTINELS.iter().any(|s| line.contains(s)) {
        return InstallPhase::Failed(line.to_string());
    }
    InstallPhase::InProgress(line.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::decode_frame;

    fn log(line: &str) -> Envelope {
        decode_frame(&format!(
            r#"{{"type":"LOG","payload":{{"line":"{line}"}}}}"#
        ))
    }

    fn raw(text: &str) -> Envelope {
        Envelope::raw_fallback(text)
    }

    fn heartbeat() -> Envelope {
        decode_frame(r#"{"type":"HEARTBEAT","payload":{"cpu_usage":1.0}}"#)
    }

    #[test]
    fn starts_idle_and_ignores_traffic() {
        let mut tracker = InstallTracker::new();
        assert_eq!(tracker.phase(), &InstallPhase::Idle);
        assert_eq!(tracker.observe_batch(&[log("Downloading jar")]), None);
        assert_eq!(tracker.phase(), &InstallPhase::Idle);
    }

    #[test]
    fn request_enters_requested() {
        let mut tracker = InstallTracker::new();
        tracker.request();
        assert_eq!(tracker.phase(), &InstallPhase::Requested);
        assert!(tracker.is_watching());
    }

    #[test]
    fn log_line_becomes_progress_message() {
        let mut tracker = InstallTracker::new();
        tracker.request();
        let next = tracker.observe_batch(&[log("Downloading jar 3%")]);
        assert_eq!(
            next,
            Some(InstallPhase::InProgress("Downloading jar 3%".to_string()))
        );
    }

    #[test]
    fn raw_text_becomes_progress_message() {
        let mut tracker = InstallTracker::new();
        tracker.request();
        let next = tracker.observe_batch(&[raw("eula accepted\n")]);
        assert_eq!(
            next,
            Some(InstallPhase::InProgress("eula accepted\n".to_string()))
        );
    }

    #[test]
    fn repeated_line_is_not_a_transition() {
        let mut tracker = InstallTracker::new();
        tracker.request();
        assert!(tracker.observe_batch(&[log("Extracting")]).is_some());
        assert!(tracker.observe_batch(&[log("Extracting")]).is_none());
    }

    #[test]
    fn success_sentinel_completes_install() {
        let mut tracker = InstallTracker::new();
        tracker.request();
        tracker.observe_batch(&[log("Downloading jar")]);
        let next = tracker.observe_batch(&[log("Installation complete")]);
        assert_eq!(next, Some(InstallPhase::Succeeded));
        assert!(tracker.phase().is_terminal());
    }

    #[test]
    fn success_sentinel_matches_as_substring() {
        let mut tracker = InstallTracker::new();
        tracker.request();
        let next = tracker.observe_batch(&[log("[INFO] Installation complete in 42s")]);
        assert_eq!(next, Some(InstallPhase::Succeeded));
    }

    #[test]
    fn download_failure_keeps_full_line_as_reason() {
        let mut tracker = InstallTracker::new();
        tracker.request();
        tracker.observe_batch(&[log("Resolving version")]);
        let next = tracker.observe_batch(&[log("Failed to download jar")]);
        assert_eq!(
            next,
            Some(InstallPhase::Failed("Failed to download jar".to_string()))
        );
    }

    #[test]
    fn failure_reason_is_the_whole_line() {
        let mut tracker = InstallTracker::new();
        tracker.request();
        let next = tracker.observe_batch(&[log("[ERROR] Failed to create world directory")]);
        assert_eq!(
            next,
            Some(InstallPhase::Failed(
                "[ERROR] Failed to create world directory".to_string()
            ))
        );
    }

    #[test]
    fn newest_line_wins_within_a_batch() {
        let mut tracker = InstallTracker::new();
        tracker.request();
        // The success line is stale; the newest entry is plain progress.
        let next = tracker.observe_batch(&[
            log("Installation complete"),
            log("Verifying checksums"),
        ]);
        assert_eq!(
            next,
            Some(InstallPhase::InProgress("Verifying checksums".to_string()))
        );
    }

    #[test]
    fn scanner_skips_non_log_traffic() {
        let mut tracker = InstallTracker::new();
        tracker.request();
        // The heartbeat is newer, but only LOG/RAW entries are recognized.
        let next = tracker.observe_batch(&[log("Unpacking"), heartbeat()]);
        assert_eq!(
            next,
            Some(InstallPhase::InProgress("Unpacking".to_string()))
        );
    }

    #[test]
    fn terminal_phase_is_sticky() {
        let mut tracker = InstallTracker::new();
        tracker.request();
        tracker.observe_batch(&[log("Failed to install dependencies")]);
        assert!(tracker.phase().is_terminal());
        assert_eq!(tracker.observe_batch(&[log("Downloading jar")]), None);
        assert!(matches!(tracker.phase(), InstallPhase::Failed(_)));
    }

    #[test]
    fn re_request_discards_stale_failure() {
        let mut tracker = InstallTracker::new();
        tracker.request();
        tracker.observe_batch(&[log("Failed to download jar")]);
        tracker.request();
        assert_eq!(tracker.phase(), &InstallPhase::Requested);
        let next = tracker.observe_batch(&[log("Downloading jar")]);
        assert_eq!(
            next,
            Some(InstallPhase::InProgress("Downloading jar".to_string()))
        );
    }

    #[test]
    fn phase_display_strings() {
        assert_eq!(InstallPhase::Idle.to_string(), "IDLE");
        assert_eq!(
            InstallPhase::InProgress("step 1".to_string()).to_string(),
            "IN_PROGRESS: step 1"
        );
        assert_eq!(
            InstallPhase::Failed("Failed to install".to_string()).to_string(),
            "FAILED: Failed to install"
        );
    }
}
