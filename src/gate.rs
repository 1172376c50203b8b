//! Permission gate: engine-owned eligibility rules for permission glyphs.
//!
//! The model may *claim* that a document qualifies for a permission glyph; the
//! claim is recorded for audit but never trusted. A permission glyph survives
//! gating only if the document content itself matches at least one qualifying
//! condition below. The check is content-based: which glyph is being gated
//! never changes what counts as eligible.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::lexicon::Lexicon;
use crate::response::{Candidate, ConstraintViolation};
use crate::vault::StreamType;

/// Total glyph cap for a personal (un-elevated) stream.
pub const PERSONAL_STREAM_CAP: usize = 3;

/// Total glyph cap for a shared (elevated) stream.
pub const SHARED_STREAM_CAP: usize = 7;

const SHARED_TRAUMA_MARKERS: &[&str] = &[
    r"(?i)\bwe both\b",
    r"(?i)\bboth of us\b",
    r"(?i)\btogether we\b",
    r"(?i)\bour (?:grief|loss|trauma|wound|mourning)\b",
    r"(?i)\bshared (?:grief|loss|pain|trauma)\b",
    r"(?i)\bwe (?:lost|buried|mourned|survived)\b",
    r"(?i)\bheld each other\b",
];

const THRESHOLD_MARKERS: &[&str] = &[
    r"(?i)\bthreshold\b",
    r"(?i)\bliminal\b",
    r"(?i)\binitiat(?:ion|ed)\b",
    r"(?i)\brite of passage\b",
    r"(?i)\bcross(?:ing|ed) (?:a|the|into|over)\b",
    r"(?i)\b(?:doorway|portal|gateway)\b",
    r"(?i)\bon the (?:edge|verge|brink) of\b",
];

const NONLINEAR_TIME_MARKERS: &[&str] = &[
    r"(?i)\bd[eé]j[aà] vu\b",
    r"(?i)\btime (?:folded|looped|collapsed|stood still|ran backwards?)\b",
    r"(?i)\bout of (?:order|sequence)\b",
    r"(?i)\b(?:past|future) self\b",
    r"(?i)\bflashback\b",
    r"(?i)\bpremonition\b",
    r"(?i)\bagain and again\b",
    r"(?i)\breliv(?:ed|ing)\b",
    r"(?i)\bbefore it (?:happens|happened)\b",
];

struct Markers {
    shared_trauma: Vec<Regex>,
    threshold: Vec<Regex>,
    nonlinear_time: Vec<Regex>,
}

fn markers() -> &'static Markers {
    static MARKERS: OnceLock<Markers> = OnceLock::new();
    MARKERS.get_or_init(|| {
        let compile = |patterns: &[&str]| {
            patterns
                .iter()
                .map(|p| Regex::new(p).expect("marker pattern compiles"))
                .collect()
        };
        Markers {
            shared_trauma: compile(SHARED_TRAUMA_MARKERS),
            threshold: compile(THRESHOLD_MARKERS),
            nonlinear_time: compile(NONLINEAR_TIME_MARKERS),
        }
    })
}

/// Evidence of qualifying content, per condition.
///
/// Each entry is the matched text snippet, so a denial or grant can be traced
/// back to the exact wording that triggered it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EligibilityReport {
    pub shared_trauma: Vec<String>,
    pub threshold: Vec<String>,
    pub nonlinear_time: Vec<String>,
}

impl EligibilityReport {
    /// Whether the content qualifies for permission glyphs at all.
    pub fn qualifies(&self) -> bool {
        !self.shared_trauma.is_empty()
            || !self.threshold.is_empty()
            || !self.nonlinear_time.is_empty()
    }

    /// Names of the conditions with at least one match.
    pub fn conditions_met(&self) -> Vec<&'static str> {
        let mut met = Vec::new();
        if !self.shared_trauma.is_empty() {
            met.push("shared trauma");
        }
        if !self.threshold.is_empty() {
            met.push("threshold narrative");
        }
        if !self.nonlinear_time.is_empty() {
            met.push("non-linear time");
        }
        met
    }
}

/// Evaluate the eligibility predicate over document content.
pub fn assess(content: &str) -> EligibilityReport {
    let evidence = |regexes: &[Regex]| {
        regexes
            .iter()
            .filter_map(|re| re.find(content))
            .map(|m| m.as_str().to_string())
            .collect()
    };
    let markers = markers();
    EligibilityReport {
        shared_trauma: evidence(&markers.shared_trauma),
        threshold: evidence(&markers.threshold),
        nonlinear_time: evidence(&markers.nonlinear_time),
    }
}

/// A permission glyph removed by the gate, with the audit reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Denial {
    pub symbol: String,
    pub reason: String,
}

/// One glyph that survived validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignedGlyph {
    pub symbol: String,
    pub rationale: String,
}

/// The gated, constraint-enforced assignment — the only result ever persisted.
#[derive(Debug, Clone, Default)]
pub struct Validated {
    /// Surviving glyphs in model-stated order.
    pub glyphs: Vec<AssignedGlyph>,
    /// Violations carried from parsing plus any added here.
    pub violations: Vec<ConstraintViolation>,
    /// Permission glyphs removed, with reasons.
    pub denials: Vec<Denial>,
    /// The eligibility evidence this gating ran against.
    pub report: EligibilityReport,
}

impl Validated {
    /// Symbols of the surviving glyphs, in order.
    pub fn symbols(&self) -> Vec<String> {
        self.glyphs.iter().map(|g| g.symbol.clone()).collect()
    }
}

/// Validate a candidate against the engine-owned permission and cap rules.
pub fn gate(
    candidate: Candidate,
    content: &str,
    lexicon: &Lexicon,
    stream: StreamType,
) -> Validated {
    let report = assess(content);
    let mut validated = Validated {
        violations: candidate.violations,
        report,
        ..Default::default()
    };

    for glyph in candidate.glyphs {
        let requires_permission = lexicon
            .get(&glyph.symbol)
            .is_some_and(|def| def.requires_permission);

        if requires_permission && !validated.report.qualifies() {
            let reason = match &glyph.claim {
                Some(claim) => format!(
                    "eligibility check failed: model claimed \"{claim}\" but content \
                     shows no shared-trauma, threshold, or non-linear time markers"
                ),
                None => "eligibility check failed: content shows no shared-trauma, \
                         threshold, or non-linear time markers"
                    .to_string(),
            };
            tracing::warn!(symbol = %glyph.symbol, "permission glyph denied");
            validated.denials.push(Denial {
                symbol: glyph.symbol,
                reason,
            });
            continue;
        }

        validated.glyphs.push(AssignedGlyph {
            symbol: glyph.symbol,
            rationale: glyph.rationale,
        });
    }

    // Stream-level total cap, in model-stated order.
    let cap = match stream {
        StreamType::Personal => PERSONAL_STREAM_CAP,
        StreamType::Shared => SHARED_STREAM_CAP,
    };
    if validated.glyphs.len() > cap {
        let proposed = validated.glyphs.len();
        validated.glyphs.truncate(cap);
        validated
            .violations
            .push(ConstraintViolation::StreamCapExceeded {
                stream: stream.as_str().to_string(),
                proposed,
                kept: cap,
            });
    }

    // A shared stream must carry at least one permission glyph; otherwise the
    // assignment is withdrawn entirely (recorded, nothing written).
    if stream == StreamType::Shared {
        let has_permission = validated.glyphs.iter().any(|g| {
            lexicon
                .get(&g.symbol)
                .is_some_and(|def| def.requires_permission)
        });
        if !has_permission {
            validated.glyphs.clear();
            validated
                .violations
                .push(ConstraintViolation::SharedStreamWithoutPermissionGlyph);
        }
    }

    validated
}
