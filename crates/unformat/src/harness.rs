//! Delivery of payloads to the vulnerable target.
//!
//! A harness owns the response marker and the mechanics of getting one
//! payload in front of the target's formatter and one response back out of
//! whatever the target prints around it. The engine and the walkers only
//! ever see [`InjectionHarness::send_injection`]: one payload in, one
//! extracted response (or nothing) out.

use std::{fmt, process::Command};

use rand::{Rng, distributions::Alphanumeric, thread_rng};
use regex::Regex;
use tracing::{debug, trace};

/// Configuration faults raised while building a harness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarnessError {
    /// The command template contains no occurrence of the injection marker.
    MissingInjectionMarker {
        /// The marker that was searched for.
        marker: String,
    },
    /// The command template contains more than one occurrence of the
    /// injection marker.
    DuplicateInjectionMarker {
        /// The marker that was searched for.
        marker: String,
        /// How many occurrences were found.
        count: usize,
    },
    /// A random response marker of length zero was requested.
    InvalidMarkerLength,
}

impl fmt::Display for HarnessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingInjectionMarker { marker } => {
                write!(f, "no instances of injection marker {marker} found in arguments")
            }
            Self::DuplicateInjectionMarker { marker, count } => {
                write!(
                    f,
                    "multiple instances ({count}) of injection marker {marker} found in arguments"
                )
            }
            Self::InvalidMarkerLength => {
                write!(f, "random response marker length must be a positive integer")
            }
        }
    }
}

impl std::error::Error for HarnessError {}

/// The oracle: deliver one payload, return the extracted response or nothing.
///
/// Implementations wrap the payload in the response marker so the rendered
/// result can be extracted from arbitrary surrounding output. Anything that
/// goes wrong mid-delivery (process failure, undecodable output, markers
/// absent from the response) is an oracle *miss*, `None`, never an error;
/// only construction can fail.
pub trait InjectionHarness {
    /// Sends one payload (the format expression body, without braces) and
    /// returns the extracted response text, if any.
    fn send_injection(&self, payload: &str) -> Option<String>;

    /// The sentinel framing every payload and its rendered result.
    fn response_marker(&self) -> &str;
}

/// Returns a random alphanumeric string of the specified length.
fn random_alnum(length: usize) -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Surrounds text with the response marker on both sides.
fn wrap_with_marker(marker: &str, text: &str) -> String {
    format!("{marker}{text}{marker}")
}

/// A harness that injects payloads into a local subprocess.
///
/// The command template is a token list in which exactly one token contains
/// the injection marker; that marker is replaced with the marked, braced
/// payload for every delivery. The target's standard output is searched for
/// `<marker>(.*?)<marker>` with dot-matches-newline.
#[derive(Debug)]
pub struct SubprocessHarness {
    args: Vec<String>,
    injection_marker: String,
    response_marker: String,
    response_re: Regex,
}

impl SubprocessHarness {
    /// Builds a harness over a command template.
    ///
    /// `response_marker` overrides the random sentinel; when absent, a
    /// random alphanumeric marker of `rand_marker_len` characters is
    /// generated.
    pub fn new(
        args: Vec<String>,
        injection_marker: impl Into<String>,
        response_marker: Option<String>,
        rand_marker_len: usize,
    ) -> Result<Self, HarnessError> {
        let injection_marker = injection_marker.into();

        let count: usize = args.iter().map(|arg| arg.matches(&injection_marker).count()).sum();
        match count {
            0 => {
                return Err(HarnessError::MissingInjectionMarker {
                    marker: injection_marker,
                });
            }
            1 => {}
            _ => {
                return Err(HarnessError::DuplicateInjectionMarker {
                    marker: injection_marker,
                    count,
                });
            }
        }

        let response_marker = match response_marker {
            Some(marker) => marker,
            None if rand_marker_len == 0 => return Err(HarnessError::InvalidMarkerLength),
            None => random_alnum(rand_marker_len),
        };

        let pattern = format!("(?s){0}(.*?){0}", regex::escape(&response_marker));
        let response_re = Regex::new(&pattern).expect("escaped marker pattern is always valid");

        Ok(Self {
            args,
            injection_marker,
            response_marker,
            response_re,
        })
    }

    /// The command template tokens this harness was built over.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The sigil replaced by payloads in the command template.
    #[must_use]
    pub fn injection_marker(&self) -> &str {
        &self.injection_marker
    }

    /// Wraps a payload body in braces and frames it with the marker:
    /// `<marker>{<payload>}<marker>`.
    fn mark_payload(&self, payload: &str) -> String {
        wrap_with_marker(&self.response_marker, &format!("{{{payload}}}"))
    }

    /// Builds the concrete argv, substituting the marked payload at the
    /// single occurrence of the injection marker.
    fn build_args(&self, marked_payload: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.replacen(&self.injection_marker, marked_payload, 1))
            .collect()
    }

    /// Extracts the framed response from raw target output.
    ///
    /// Non-greedy with dotall; an empty capture counts as a miss.
    fn parse_response(&self, raw_output: &str) -> Option<String> {
        let captured = self.response_re.captures(raw_output)?.get(1)?.as_str();
        if captured.is_empty() {
            return None;
        }
        Some(captured.to_owned())
    }
}

impl InjectionHarness for SubprocessHarness {
    fn send_injection(&self, payload: &str) -> Option<String> {
        let marked = self.mark_payload(payload);
        let args = self.build_args(&marked);
        trace!(?args, "spawning target");

        let output = match Command::new(&args[0]).args(&args[1..]).output() {
            Ok(output) => output,
            Err(err) => {
                debug!(%err, payload, "target failed to spawn");
                return None;
            }
        };

        let stdout = String::from_utf8(output.stdout).ok()?;
        let response = self.parse_response(&stdout);
        debug!(payload, response = response.as_deref(), "oracle round trip");
        response
    }

    fn response_marker(&self) -> &str {
        &self.response_marker
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn harness_with_marker(marker: &str) -> SubprocessHarness {
        SubprocessHarness::new(
            vec!["target".to_owned(), "@@".to_owned()],
            "@@",
            Some(marker.to_owned()),
            16,
        )
        .unwrap()
    }

    /// Marker extraction must invert marker wrapping for any text that does
    /// not itself contain the marker.
    #[test]
    fn extraction_inverts_wrapping() {
        let harness = harness_with_marker("MK");
        for text in ["x", "<class 'X'>", "multi\nline\ntext", "{'a': 1}"] {
            let wrapped = wrap_with_marker(harness.response_marker(), text);
            assert_eq!(harness.parse_response(&wrapped).as_deref(), Some(text));
        }
    }

    #[test]
    fn extraction_is_non_greedy_across_noise() {
        let harness = harness_with_marker("MK");
        let output = "prefix MKfirstMK middle MKsecondMK suffix";
        assert_eq!(harness.parse_response(output).as_deref(), Some("first"));
    }

    #[test]
    fn extraction_spans_newlines() {
        let harness = harness_with_marker("MK");
        assert_eq!(
            harness.parse_response("MKline one\nline twoMK").as_deref(),
            Some("line one\nline two")
        );
    }

    #[test]
    fn empty_capture_is_a_miss() {
        let harness = harness_with_marker("MK");
        assert_eq!(harness.parse_response("MKMK"), None);
        assert_eq!(harness.parse_response("no markers at all"), None);
    }

    #[test]
    fn regex_metacharacters_in_override_marker_are_escaped() {
        let harness = harness_with_marker("a.b");
        assert_eq!(harness.parse_response("a.bvaluea.b").as_deref(), Some("value"));
        assert_eq!(harness.parse_response("aXbvalueaXb"), None);
    }

    #[test]
    fn payload_is_braced_and_framed() {
        let harness = harness_with_marker("MK");
        assert_eq!(harness.mark_payload("0.__class__"), "MK{0.__class__}MK");
    }

    #[test]
    fn substitution_hits_only_the_marker_token() {
        let harness = SubprocessHarness::new(
            vec!["prog".to_owned(), "--flag".to_owned(), "pre@@post".to_owned()],
            "@@",
            Some("MK".to_owned()),
            16,
        )
        .unwrap();
        let args = harness.build_args("PAYLOAD");
        assert_eq!(args, vec!["prog", "--flag", "prePAYLOADpost"]);
    }

    #[test]
    fn zero_markers_fail_construction() {
        let err = SubprocessHarness::new(vec!["prog".to_owned()], "@@", None, 16).unwrap_err();
        assert_eq!(
            err,
            HarnessError::MissingInjectionMarker {
                marker: "@@".to_owned()
            }
        );
    }

    #[test]
    fn multiple_markers_fail_construction() {
        let err = SubprocessHarness::new(
            vec!["prog".to_owned(), "@@".to_owned(), "again@@".to_owned()],
            "@@",
            None,
            16,
        )
        .unwrap_err();
        assert_eq!(
            err,
            HarnessError::DuplicateInjectionMarker {
                marker: "@@".to_owned(),
                count: 2
            }
        );
    }

    #[test]
    fn zero_length_random_marker_fails_construction() {
        let err = SubprocessHarness::new(vec!["@@".to_owned()], "@@", None, 0).unwrap_err();
        assert_eq!(err, HarnessError::InvalidMarkerLength);
    }

    #[test]
    fn random_marker_is_alphanumeric_of_requested_length() {
        let harness = SubprocessHarness::new(vec!["@@".to_owned()], "@@", None, 24).unwrap();
        let marker = harness.response_marker();
        assert_eq!(marker.len(), 24);
        assert!(marker.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
