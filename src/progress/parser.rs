//! Best-effort line grammar for external build/sync tool output
//!
//! Evaluation is an ordered rule table: each rule pairs a predicate with an
//! event constructor, the first matching rule wins, and a line matching no rule
//! produces no event. Extending the grammar means appending a rule, not
//! touching control flow.

use once_cell::sync::Lazy;
use regex::Regex;

use super::ProgressEvent;
use crate::operation::OperationKind;

/// Stateless-per-call rule evaluator bound to one operation.
///
/// The only state carried across lines is the monotone percentage baseline and
/// the one-shot dependency-phase flag, both reset only at operation start.
#[derive(Debug)]
pub struct ProgressParser {
    kind: OperationKind,
    baseline: u8,
    reported_dependencies: bool,
}

struct Rule {
    /// `None` applies to every operation kind.
    kind: Option<OperationKind>,
    matches: fn(&str) -> bool,
    construct: fn(&mut ProgressParser, &str) -> ProgressEvent,
}

// Ordered by priority; first match wins. The patch-completion rule sits above
// the patch-running rule because the elapsed-time log also names the script.
const RULES: &[Rule] = &[
    Rule {
        kind: None,
        matches: is_regenerating_build_files,
        construct: regenerating_event,
    },
    Rule {
        kind: None,
        matches: has_leading_percent,
        construct: percent_event,
    },
    Rule {
        kind: None,
        matches: is_goma_start,
        construct: goma_event,
    },
    Rule {
        kind: None,
        matches: is_ninja_start,
        construct: starting_event,
    },
    Rule {
        kind: Some(OperationKind::Sync),
        matches: is_patch_script_done,
        construct: finishing_event,
    },
    Rule {
        kind: Some(OperationKind::Sync),
        matches: is_patch_script_running,
        construct: applying_patches_event,
    },
];

static REGENERATING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)regenerating ninja files").expect("valid regenerating pattern")
});
// Startup markers only. A bare tool-name match would also fire on mid-build
// diagnostics such as "ninja: build stopped".
static GOMA_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)starting\s+(the\s+)?goma|goma_ctl(\.py)?'?\s+(ensure_)?(re)?start")
        .expect("valid goma start pattern")
});
static NINJA_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)running:?\s+'?(\S*[\\/])?(auto)?ninja\b").expect("valid ninja start pattern")
});
static PATCH_DONE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)apply_patches.*took\s+[0-9.]+\s+secs").expect("valid patch-done pattern")
});
static PATCH_RUNNING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)running\s+.*apply_patches").expect("valid patch-running pattern")
});

fn is_regenerating_build_files(line: &str) -> bool {
    REGENERATING.is_match(line)
}

fn has_leading_percent(line: &str) -> bool {
    leading_percent(line).is_some()
}

fn is_goma_start(line: &str) -> bool {
    GOMA_START.is_match(line)
}

fn is_ninja_start(line: &str) -> bool {
    NINJA_START.is_match(line)
}

fn is_patch_script_done(line: &str) -> bool {
    PATCH_DONE.is_match(line)
}

fn is_patch_script_running(line: &str) -> bool {
    PATCH_RUNNING.is_match(line)
}

fn regenerating_event(_parser: &mut ProgressParser, _line: &str) -> ProgressEvent {
    // Phase label changes without moving the percentage; the baseline is
    // deliberately left untouched.
    ProgressEvent::PhaseChanged {
        label: "Regenerating Ninja Files",
    }
}

fn percent_event(parser: &mut ProgressParser, line: &str) -> ProgressEvent {
    let Some(value) = leading_percent(line) else {
        return ProgressEvent::NoOp;
    };
    if value <= parser.baseline {
        // Regressions and duplicate reports are suppressed at the source.
        return ProgressEvent::NoOp;
    }
    let increment = value - parser.baseline;
    parser.baseline = value;
    ProgressEvent::PercentAdvanced {
        label: "Compiling",
        increment,
    }
}

fn goma_event(_parser: &mut ProgressParser, _line: &str) -> ProgressEvent {
    ProgressEvent::PhaseChanged {
        label: "Starting Goma",
    }
}

fn starting_event(_parser: &mut ProgressParser, _line: &str) -> ProgressEvent {
    ProgressEvent::PhaseChanged { label: "Starting" }
}

fn finishing_event(_parser: &mut ProgressParser, _line: &str) -> ProgressEvent {
    ProgressEvent::PhaseChanged {
        label: "Finishing Up",
    }
}

fn applying_patches_event(_parser: &mut ProgressParser, _line: &str) -> ProgressEvent {
    ProgressEvent::PhaseChanged {
        label: "Applying Patches",
    }
}

/// Parse a leading integer token immediately preceding a literal percent sign,
/// as emitted by ninja under a `"<percent>% <done>/<total>"` status format.
fn leading_percent(line: &str) -> Option<u8> {
    let trimmed = line.trim_start();
    let digits: String = trimmed.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    if !trimmed[digits.len()..].starts_with('%') {
        return None;
    }
    digits.parse::<u32>().ok().filter(|v| *v <= 100).map(|v| v as u8)
}

impl ProgressParser {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            baseline: 0,
            reported_dependencies: false,
        }
    }

    /// Highest percentage accepted so far; never decreases.
    pub fn baseline(&self) -> u8 {
        self.baseline
    }

    /// Turn one output line into zero or one progress events.
    pub fn parse_line(&mut self, line: &str) -> ProgressEvent {
        for rule in RULES {
            let kind_applies = rule.kind.map_or(true, |k| k == self.kind);
            if kind_applies && (rule.matches)(line) {
                return (rule.construct)(self, line);
            }
        }

        // Sync output starts with dependency fetching that has no recognizable
        // marker, so the very first unmatched line reports it, once.
        if self.kind == OperationKind::Sync && !self.reported_dependencies {
            self.reported_dependencies = true;
            return ProgressEvent::PhaseChanged {
                label: "Dependencies",
            };
        }

        ProgressEvent::NoOp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phase(label: &'static str) -> ProgressEvent {
        ProgressEvent::PhaseChanged { label }
    }

    fn percent(increment: u8) -> ProgressEvent {
        ProgressEvent::PercentAdvanced {
            label: "Compiling",
            increment,
        }
    }

    #[test]
    fn build_end_to_end_scenario() {
        let mut parser = ProgressParser::new(OperationKind::Build);
        let lines = ["Running ninja...", "10% 5/50", "25% 12/50", "30% 15/50"];
        let events: Vec<_> = lines.iter().map(|l| parser.parse_line(l)).collect();
        assert_eq!(
            events,
            vec![phase("Starting"), percent(10), percent(15), percent(5)]
        );
        assert_eq!(parser.baseline(), 30);
    }

    #[test]
    fn regression_and_duplicates_are_suppressed() {
        let mut parser = ProgressParser::new(OperationKind::Build);
        assert_eq!(parser.parse_line("50% 5/10"), percent(50));
        assert_eq!(parser.parse_line("30% 3/10"), ProgressEvent::NoOp);
        assert_eq!(parser.parse_line("50% 5/10"), ProgressEvent::NoOp);
        assert_eq!(parser.parse_line("70% 7/10"), percent(20));
        assert_eq!(parser.baseline(), 70);
    }

    #[test]
    fn increments_sum_to_final_minus_initial() {
        let mut parser = ProgressParser::new(OperationKind::Build);
        let values = [5u8, 3, 12, 12, 40, 22, 97, 100];
        let mut total = 0u32;
        for value in values {
            if let ProgressEvent::PercentAdvanced { increment, .. } =
                parser.parse_line(&format!("{value}% {value}/100"))
            {
                total += u32::from(increment);
            }
        }
        assert_eq!(total, 100);
        assert_eq!(parser.baseline(), 100);
    }

    #[test]
    fn regenerating_marker_is_case_insensitive_and_keeps_baseline() {
        let mut parser = ProgressParser::new(OperationKind::Build);
        assert_eq!(parser.parse_line("40% 4/10"), percent(40));
        assert_eq!(
            parser.parse_line("Regenerating Ninja files..."),
            phase("Regenerating Ninja Files")
        );
        assert_eq!(
            parser.parse_line("REGENERATING NINJA FILES"),
            phase("Regenerating Ninja Files")
        );
        // Baseline continues from its prior value after the phase change.
        assert_eq!(parser.parse_line("41% 5/10"), percent(1));
    }

    #[test]
    fn regenerating_wins_over_plain_ninja_marker() {
        let mut parser = ProgressParser::new(OperationKind::Build);
        assert_eq!(
            parser.parse_line("regenerating ninja files"),
            phase("Regenerating Ninja Files")
        );
    }

    #[test]
    fn goma_and_ninja_start_markers() {
        let mut parser = ProgressParser::new(OperationKind::Build);
        assert_eq!(
            parser.parse_line("Starting the Goma compiler proxy"),
            phase("Starting Goma")
        );
        assert_eq!(
            parser.parse_line("Running 'goma_ctl.py ensure_start'"),
            phase("Starting Goma")
        );
        assert_eq!(parser.parse_line("Running ninja..."), phase("Starting"));
        assert_eq!(
            parser.parse_line("Running: autoninja -C out/Default chrome"),
            phase("Starting")
        );
    }

    #[test]
    fn mid_build_diagnostics_do_not_rereport_startup_phases() {
        let mut parser = ProgressParser::new(OperationKind::Build);
        assert_eq!(parser.parse_line("40% 4/10"), percent(40));
        assert_eq!(
            parser.parse_line("ninja: build stopped: subcommand failed."),
            ProgressEvent::NoOp
        );
        assert_eq!(parser.parse_line("ninja: no work to do."), ProgressEvent::NoOp);
        assert_eq!(
            parser.parse_line("goma is enabled for this build"),
            ProgressEvent::NoOp
        );
        assert_eq!(parser.parse_line("warning: goma not used"), ProgressEvent::NoOp);
    }

    #[test]
    fn percent_wins_over_phase_markers() {
        let mut parser = ProgressParser::new(OperationKind::Build);
        assert_eq!(parser.parse_line("12% goma ninja"), percent(12));
    }

    #[test]
    fn unmatched_build_lines_produce_no_event() {
        let mut parser = ProgressParser::new(OperationKind::Build);
        assert_eq!(parser.parse_line("clang -c foo.cc"), ProgressEvent::NoOp);
        assert_eq!(parser.parse_line(""), ProgressEvent::NoOp);
        assert_eq!(parser.parse_line("101% 101/100"), ProgressEvent::NoOp);
        assert_eq!(parser.parse_line("10 percent"), ProgressEvent::NoOp);
    }

    #[test]
    fn sync_dependency_phase_is_one_shot() {
        let mut parser = ProgressParser::new(OperationKind::Sync);
        let mut events = Vec::new();
        for i in 0..10 {
            events.push(parser.parse_line(&format!("fetching dependency {i}")));
        }
        events.push(parser.parse_line("________ running 'python apply_patches.py'"));

        let dependencies = events
            .iter()
            .filter(|e| **e == phase("Dependencies"))
            .count();
        assert_eq!(dependencies, 1);
        assert_eq!(events[0], phase("Dependencies"));
        assert_eq!(events[10], phase("Applying Patches"));
        for event in &events[1..10] {
            assert_eq!(*event, ProgressEvent::NoOp);
        }
    }

    #[test]
    fn patch_completion_reports_finishing_up() {
        let mut parser = ProgressParser::new(OperationKind::Sync);
        parser.parse_line("syncing projects");
        assert_eq!(
            parser.parse_line("Hook 'python apply_patches.py' took 4.9 secs"),
            phase("Finishing Up")
        );
    }

    #[test]
    fn sync_markers_do_not_apply_to_builds() {
        let mut parser = ProgressParser::new(OperationKind::Build);
        assert_eq!(
            parser.parse_line("________ running 'python apply_patches.py'"),
            ProgressEvent::NoOp
        );
    }

    #[test]
    fn leading_percent_tolerates_indentation() {
        assert_eq!(leading_percent("  50% 5/10"), Some(50));
        assert_eq!(leading_percent("0% 0/10"), Some(0));
        assert_eq!(leading_percent("100% 10/10"), Some(100));
        assert_eq!(leading_percent("x50%"), None);
        assert_eq!(leading_percent("50 %"), None);
    }
}
