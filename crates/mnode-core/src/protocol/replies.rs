//! Text contracts of `masternodebroadcast` replies.
//!
//! The backend answers both `decode` and `relay` with an object holding an
//! `overall` summary string plus one entry per broadcast key, each possibly
//! carrying an `errorMessage`.  Success is only ever expressed in the wording
//! of `overall`, so these parsers are tied to the backend's exact phrasing.
//! [`RelaySummaryParser`] keeps that dependency in one replaceable place.

/// Prefix of `overall` when the backend accepted the payload's format.
pub const DECODE_SUCCESS_MARKER: &str = "Successfully decoded broadcast messages for 1 masternodes";

/// Reply of `masternodebroadcast decode|relay`, in key order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReply {
    pub overall: String,
    /// Per-key entries other than `overall`.
    pub entries: Vec<ReplyEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplyEntry {
    pub key: String,
    pub error_message: Option<String>,
}

impl BroadcastReply {
    pub fn is_decode_success(&self) -> bool {
        self.overall.starts_with(DECODE_SUCCESS_MARKER)
    }

    /// `errorMessage` of the first per-key entry, which is the only one for
    /// a single-masternode broadcast.
    pub fn first_error_message(&self) -> Option<&str> {
        self.entries.first().and_then(|e| e.error_message.as_deref())
    }
}

/// Counts extracted from a relay reply's `overall` text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelaySummary {
    pub relayed: u32,
    pub failed: u32,
}

impl RelaySummary {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Extracts relay counts from the backend's summary wording.
///
/// Text the parser does not recognise yields zero counts, which reads as
/// success.
pub trait RelaySummaryParser: Send + Sync {
    fn parse(&self, overall: &str) -> RelaySummary;
}

/// Parser for the daemon's phrasing:
/// `relayed broadcast messages for N masternodes … failed to relay M, total 1`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DashdRelaySummary;

const RELAYED_HEAD: &str = "relayed broadcast messages for ";
const RELAYED_TAIL: &str = " masternodes";
const FAILED_HEAD: &str = "failed to relay ";
const FAILED_TAIL: &str = ", total 1";

impl RelaySummaryParser for DashdRelaySummary {
    fn parse(&self, overall: &str) -> RelaySummary {
        for (start, _) in overall.match_indices(RELAYED_HEAD) {
            let rest = &overall[start + RELAYED_HEAD.len()..];
            let Some((relayed, rest)) = leading_number(rest) else {
                continue;
            };
            let Some(rest) = rest.strip_prefix(RELAYED_TAIL) else {
                continue;
            };
            // The failed count is the last one followed by the total.
            let failed = rest
                .rmatch_indices(FAILED_HEAD)
                .filter_map(|(i, _)| {
                    let (n, tail) = leading_number(&rest[i + FAILED_HEAD.len()..])?;
                    tail.starts_with(FAILED_TAIL).then_some(n)
                })
                .next();
            if let Some(failed) = failed {
                return RelaySummary { relayed, failed };
            }
        }
        RelaySummary::default()
    }
}

fn leading_number(s: &str) -> Option<(u32, &str)> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    let n = s[..end].parse().ok()?;
    Some((n, &s[end..]))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
