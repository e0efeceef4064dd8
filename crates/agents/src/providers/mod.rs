pub mod chatgpt;

pub use chatgpt::ChatGptBackend;

/// Strip the `data:` prefix from an SSE line, with or without the space.
pub(crate) fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data: ")
        .or_else(|| line.strip_prefix("data:"))
}
