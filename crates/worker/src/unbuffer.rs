//! The output-unbuffering wrapper for pattern-matched invocations (§4.2.2,
//! §9: "implemented but disabled by default ... never applied silently").
//!
//! When a pattern is configured and the job's command name matches it, the
//! remote invocation is wrapped in a small shell probe that tries
//! `stdbuf -oL`, then `unbuffer`, and falls back to the unwrapped command if
//! neither is resolvable on the remote host — the probing happens on the
//! remote side so the worker never needs a round trip to discover what's
//! installed there.

/// Whether `command`'s program name matches `pattern`. Matching is by
/// basename equality (`/usr/bin/ping` matches the pattern `ping`), not a
/// full glob — sufficient for the documented `ping`-like use case.
#[must_use]
pub fn matches_pattern(command: &str, pattern: &str) -> bool {
    let program = command.split_whitespace().next().unwrap_or(command);
    let basename = program.rsplit('/').next().unwrap_or(program);
    basename == pattern
}

/// Wraps `command` in a probe that prefers `stdbuf -oL`, falls back to
/// `unbuffer`, and finally runs `command` unwrapped.
#[must_use]
pub fn wrap(command: &str) -> String {
    format!(
        "if command -v stdbuf >/dev/null 2>&1; then exec stdbuf -oL {command}; \
         elif command -v unbuffer >/dev/null 2>&1; then exec unbuffer {command}; \
         else exec {command}; fi"
    )
}

/// Applies [`wrap`] to `command` only if `pattern` is configured and
/// matches the command's program name; otherwise returns `command`
/// unchanged. This is the single call site that decides whether the
/// heuristic fires — by default `pattern` is `None` and nothing changes.
#[must_use]
pub fn maybe_wrap(command: String, pattern: Option<&str>) -> String {
    match pattern {
        Some(pattern) if matches_pattern(&command, pattern) => wrap(&command),
        _ => command,
    }
}
