//! Pattern extraction from switch CLI and module shell output.
//!
//! Output is captured as decoded text with no framing guarantees, so every
//! extraction here is a regex over the whole capture.

use std::sync::LazyLock;

use regex::Regex;

static COUNTER_0: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"CNT 0:\s+(\d+)").expect("static pattern"));

static COUNTER_1: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"CNT 1:\s+(\d+)").expect("static pattern"));

/// Link state of a list of interfaces, as reported by one switch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkReport {
    /// Interfaces whose state reads as down, in request order.
    pub down: Vec<String>,
    /// Interfaces absent from the switch output.
    pub missing: Vec<String>,
}

impl LinkReport {
    /// Returns true if every requested interface was found.
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Extract the operational state of each interface in `interfaces`.
///
/// An interface is down when the first token after its name contains
/// "down" (case-insensitive). An interface that does not appear in the
/// output goes to `missing`, never to `down`.
pub fn link_states(output: &str, interfaces: &[String]) -> LinkReport {
    let mut report = LinkReport::default();

    for intf in interfaces {
        // A leading digit or slash would mean we matched the tail of a longer
        // name, e.g. "1/0/1" inside "1/0/11" or "11/0/1".
        let pattern = format!(r"(?m)(?:^|[^\d/]){}\s+(\S+)", regex::escape(intf));
        let Ok(re) = Regex::new(&pattern) else {
            report.missing.push(intf.clone());
            continue;
        };

        match re.captures(output).and_then(|c| c.get(1)) {
            Some(state) if state.as_str().to_lowercase().contains("down") => {
                report.down.push(intf.clone());
            }
            Some(_) => {}
            None => report.missing.push(intf.clone()),
        }
    }

    report
}

/// Expand an interface range in switch syntax into the interfaces it names.
///
/// `1/0/1-28` covers `1/0/1` through `1/0/28`; comma-separated parts are
/// joined, so `1/0/1-4,1/0/9` names five interfaces. `None` when any part
/// is malformed or a span runs backwards.
pub fn expand_interface_range(range: &str) -> Option<Vec<String>> {
    let mut interfaces = Vec::new();
    for part in range.split(',').map(str::trim) {
        let (prefix, tail) = match part.rfind('/') {
            Some(slash) => part.split_at(slash + 1),
            None => return None,
        };
        if prefix.len() < 2 {
            return None;
        }
        let (first, last) = match tail.split_once('-') {
            Some((a, b)) => (a.parse::<u32>().ok()?, b.parse::<u32>().ok()?),
            None => {
                let n = tail.parse::<u32>().ok()?;
                (n, n)
            }
        };
        if first > last {
            return None;
        }
        interfaces.extend((first..=last).map(|n| format!("{prefix}{n}")));
    }
    Some(interfaces)
}

/// Extract the two clock counters from `clk_ctl.py -t 1` output.
pub fn clock_counters(output: &str) -> Option<(u64, u64)> {
    let a = COUNTER_0.captures(output)?.get(1)?.as_str().parse().ok()?;
    let b = COUNTER_1.captures(output)?.get(1)?.as_str().parse().ok()?;
    Some((a, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATUS: &str = "\
show interface ethernet status\r
Port      Status   Speed\r
1/0/1     Up       1000M\r
1/0/2     Down     Auto\r
1/0/11    Down     Auto\r
1/0/12    Up       1000M\r
switch#";

    fn ports(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn finds_down_interfaces() {
        let report = link_states(STATUS, &ports(&["1/0/1", "1/0/2", "1/0/12"]));
        assert_eq!(report.down, ports(&["1/0/2"]));
        assert!(report.is_complete());
    }

    #[test]
    fn does_not_match_longer_interface_names() {
        // 1/0/1 is up; 1/0/11 being down must not leak into it
        let report = link_states(STATUS, &ports(&["1/0/1"]));
        assert!(report.down.is_empty());

        let report = link_states(STATUS, &ports(&["1/0/11"]));
        assert_eq!(report.down, ports(&["1/0/11"]));
    }

    #[test]
    fn missing_interface_is_excluded() {
        let report = link_states(STATUS, &ports(&["1/0/2", "1/0/27"]));
        assert_eq!(report.down, ports(&["1/0/2"]));
        assert_eq!(report.missing, ports(&["1/0/27"]));
        assert!(!report.is_complete());
    }

    #[test]
    fn empty_output_reports_everything_missing() {
        let report = link_states("", &ports(&["1/0/1"]));
        assert!(report.down.is_empty());
        assert_eq!(report.missing.len(), 1);
    }

    #[test]
    fn expands_interface_ranges() {
        assert_eq!(
            expand_interface_range("1/0/1-3"),
            Some(ports(&["1/0/1", "1/0/2", "1/0/3"]))
        );
        assert_eq!(expand_interface_range("1/0/1-28").map(|v| v.len()), Some(28));
        assert_eq!(
            expand_interface_range("1/0/1-2, 1/0/9"),
            Some(ports(&["1/0/1", "1/0/2", "1/0/9"]))
        );
        assert_eq!(expand_interface_range("1/0/7"), Some(ports(&["1/0/7"])));
    }

    #[test]
    fn rejects_malformed_ranges() {
        assert_eq!(expand_interface_range(""), None);
        assert_eq!(expand_interface_range("eth1-4"), None);
        assert_eq!(expand_interface_range("1/0/9-2"), None);
        assert_eq!(expand_interface_range("1/0/a-b"), None);
    }

    #[test]
    fn extracts_clock_counters() {
        let out = "root@m720:~# clk_ctl.py -t 1\nCNT 0:   123456\nCNT 1: 789\n";
        assert_eq!(clock_counters(out), Some((123456, 789)));
        assert_eq!(clock_counters("CNT 0: 5\n"), None);
        assert_eq!(clock_counters("command not found"), None);
    }
}
