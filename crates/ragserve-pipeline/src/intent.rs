/// Coarse intent classification so trivial inputs never occupy the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// A bare greeting: answered canned, without retrieval or generation.
    Greeting,
    /// Three words or fewer: generated with a small budget, no retrieval.
    ShortChat,
    /// Everything else takes the full retrieval path.
    Standard,
}

pub const GREETING_REPLY: &str = "Hello! How can I help you today?";

pub fn detect_intent(text: &str) -> Intent {
    let t = text.trim().to_lowercase();
    match t.as_str() {
        "hi" | "hello" | "hey" | "good morning" | "good afternoon" | "good evening" => {
            return Intent::Greeting
        }
        _ => {}
    }
    if t.split_whitespace().count() <= 3 {
        return Intent::ShortChat;
    }
    Intent::Standard
}
