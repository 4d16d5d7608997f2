use std::time::{Duration, Instant};

use ragserve_core::traits::TextGenerator;
use ragserve_core::types::GenerationOptions;
use ragserve_generate::{find_stop, MockGenerator};

fn opts(max_new_tokens: usize) -> GenerationOptions {
    GenerationOptions { max_new_tokens, stop_sequences: vec![], deadline: None }
}

#[test]
fn mock_respects_token_budget() {
    let mut gen = MockGenerator::with_reply("one two three four five six seven");
    let out = gen.generate("prompt", &opts(3)).expect("generate");
    assert_eq!(out.text.split_whitespace().count(), 3);
    assert!(out.truncated, "budget exhaustion is reported");
    assert!(out.finished, "budget exhaustion is not a cancellation");
}

#[test]
fn mock_finishes_naturally_within_budget() {
    let mut gen = MockGenerator::with_reply("short answer");
    let out = gen.generate("prompt", &opts(100)).expect("generate");
    assert_eq!(out.text, "short answer");
    assert!(out.finished);
    assert!(!out.truncated);
}

#[test]
fn mock_deadline_returns_partial_not_error() {
    let mut gen = MockGenerator::with_reply("word ".repeat(1000))
        .with_token_delay(Duration::from_millis(5));
    let options = GenerationOptions {
        max_new_tokens: 1000,
        stop_sequences: vec![],
        deadline: Some(Instant::now() + Duration::from_millis(50)),
    };
    let out = gen.generate("prompt", &options).expect("deadline must not be an error");
    assert!(!out.finished, "deadline expiry reports finished=false");
    assert!(!out.text.is_empty(), "partial output is preserved");
    assert!(out.text.split_whitespace().count() < 1000);
}

#[test]
fn mock_stop_sequence_cuts_output() {
    let mut gen = MockGenerator::with_reply("alpha bravo STOP charlie delta");
    let options = GenerationOptions {
        max_new_tokens: 100,
        stop_sequences: vec!["STOP".to_string()],
        deadline: None,
    };
    let out = gen.generate("prompt", &options).expect("generate");
    assert_eq!(out.text, "alpha bravo");
    assert!(out.finished);
}

#[test]
fn mock_rejects_empty_prompt() {
    let mut gen = MockGenerator::new();
    assert!(gen.generate("  ", &opts(10)).is_err());
}

#[test]
fn echo_mode_returns_the_prompt() {
    let mut gen = MockGenerator::echo();
    let out = gen.generate("the exact prompt text", &opts(100)).expect("generate");
    assert_eq!(out.text, "the exact prompt text");
}

#[test]
fn find_stop_earliest_match_wins() {
    let stops = vec!["late".to_string(), "early".to_string()];
    let text = "xx early yy late zz";
    assert_eq!(find_stop(text, &stops), Some(3));
    assert_eq!(find_stop("no match here", &stops), None);
    assert_eq!(find_stop("anything", &[]), None);
}
