//! Property-based tests for the pure layers: history repair, tag splitting,
//! cost arithmetic and image sanitizing.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use platformed_ai::attachments::decode_base64;
use platformed_ai::{
    calculate_cost, sanitize_images, transform_messages, Api, AssistantMessage,
    Content, Message, Model, ModelRegistry, SanitizeConfig, StopReason, ThinkingContent,
    ThinkingTagParser, ToolCall, Usage,
};
use proptest::prelude::*;
use serde_json::json;

// =============================================================================
// Helper Functions
// =============================================================================

fn target() -> Model {
    ModelRegistry::builtin()
        .get_model("anthropic", "claude-sonnet-4-5")
        .cloned()
        .unwrap()
}

fn arb_block() -> impl Strategy<Value = Content> {
    prop_oneof![
        ("[a-z ]{0,12}", proptest::option::of("[a-z]{4}")).prop_map(|(text, signature)| {
            Content::Text(platformed_ai::TextContent { text, signature })
        }),
        ("[a-z ]{0,12}", proptest::option::of("[a-z]{4}"), any::<bool>()).prop_map(
            |(thinking, signature, redacted)| {
                Content::Thinking(ThinkingContent {
                    thinking,
                    redacted: redacted && signature.is_some(),
                    signature,
                })
            }
        ),
        (0..4u8, proptest::option::of("[a-z]{4}")).prop_map(|(id, thought_signature)| {
            Content::ToolCall(ToolCall {
                id: format!("call_{id}"),
                name: "read".to_string(),
                arguments: json!({"path": "a.txt"}),
                thought_signature,
            })
        }),
    ]
}

fn arb_stop_reason() -> impl Strategy<Value = StopReason> {
    prop_oneof![
        3 => Just(StopReason::Stop),
        3 => Just(StopReason::ToolUse),
        1 => Just(StopReason::Length),
        1 => Just(StopReason::Error),
        1 => Just(StopReason::Aborted),
    ]
}

fn arb_assistant() -> impl Strategy<Value = Message> {
    (
        prop::collection::vec(arb_block(), 0..4),
        arb_stop_reason(),
        any::<bool>(),
    )
        .prop_map(|(content, stop_reason, foreign)| {
            let (api, provider, model) = if foreign {
                (Api::OpenAIResponses, "openai", "gpt-5")
            } else {
                (Api::AnthropicMessages, "anthropic", "claude-sonnet-4-5")
            };
            Message::Assistant(AssistantMessage {
                content,
                api,
                provider: provider.to_string(),
                model: model.to_string(),
                usage: Usage::default(),
                stop_reason,
                error_message: None,
                timestamp: 1,
            })
        })
}

fn arb_message() -> impl Strategy<Value = Message> {
    prop_oneof![
        "[a-z ]{1,10}".prop_map(|text| Message::user(text)),
        arb_assistant(),
        (0..4u8, "[a-z]{0,6}", any::<bool>()).prop_map(|(id, output, is_error)| {
            Message::tool_result(format!("call_{id}"), "read", output, is_error)
        }),
    ]
}

/// Text made of letters, angle brackets and whole or broken tags.
fn arb_tagged_text() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            "[a-z </>]{0,6}".prop_map(String::from),
            Just("<thinking>".to_string()),
            Just("</thinking>".to_string()),
            Just("<think".to_string()),
        ],
        0..12,
    )
    .prop_map(|parts| parts.concat())
}

fn run_parser(chunks: &[&str]) -> (String, String) {
    let mut parser = ThinkingTagParser::new();
    let (mut thinking, mut text) = (String::new(), String::new());
    for chunk in chunks {
        let processed = parser.process(chunk, false);
        thinking.push_str(&processed.thinking);
        text.push_str(&processed.text);
    }
    if let Some(rest) = parser.flush() {
        if rest.is_thinking {
            thinking.push_str(&rest.text);
        } else {
            text.push_str(&rest.text);
        }
    }
    (thinking, text)
}

fn usage(input: u64, output: u64, cache_read: u64, cache_write: u64) -> Usage {
    Usage {
        input,
        output,
        cache_read,
        cache_write,
        ..Usage::default()
    }
}

// =============================================================================
// History repair
// =============================================================================

proptest! {
    #[test]
    fn prop_transform_is_idempotent(history in prop::collection::vec(arb_message(), 0..12)) {
        let model = target();
        let once = transform_messages(&history, &model);
        let twice = transform_messages(&once, &model);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn prop_failed_turns_never_survive(history in prop::collection::vec(arb_message(), 0..12)) {
        let out = transform_messages(&history, &target());
        for message in &out {
            if let Message::Assistant(assistant) = message {
                prop_assert!(!assistant.stop_reason.is_failure());
            }
        }
    }

    #[test]
    fn prop_tool_results_follow_their_call(history in prop::collection::vec(arb_message(), 0..12)) {
        let out = transform_messages(&history, &target());
        let mut open: Vec<String> = Vec::new();
        for message in &out {
            match message {
                Message::Assistant(assistant) => {
                    open = assistant.tool_calls().map(|c| c.id.clone()).collect();
                }
                Message::ToolResult(result) => {
                    let at = open.iter().position(|id| *id == result.tool_call_id);
                    prop_assert!(at.is_some(), "result {} has no open call", result.tool_call_id);
                    open.retain(|id| *id != result.tool_call_id);
                }
                _ => open.clear(),
            }
        }
    }

    #[test]
    fn prop_signatures_scoped_to_producing_model(
        history in prop::collection::vec(arb_message(), 0..12),
    ) {
        let model = target();
        let out = transform_messages(&history, &model);
        for message in &out {
            let Message::Assistant(assistant) = message else { continue };
            if assistant.provider == model.provider && assistant.model == model.id {
                continue;
            }
            for block in &assistant.content {
                match block {
                    Content::Text(text) => prop_assert!(text.signature.is_none()),
                    Content::ToolCall(call) => prop_assert!(call.thought_signature.is_none()),
                    Content::Thinking(_) => prop_assert!(false, "foreign thinking block survived"),
                    _ => {}
                }
            }
        }
    }

    #[test]
    fn prop_no_consecutive_user_turns(history in prop::collection::vec(arb_message(), 0..12)) {
        let out = transform_messages(&history, &target());
        for pair in out.windows(2) {
            let both_user =
                matches!(pair[0], Message::User(_)) && matches!(pair[1], Message::User(_));
            prop_assert!(!both_user);
        }
    }
}

// =============================================================================
// Thinking tags
// =============================================================================

proptest! {
    #[test]
    fn prop_tag_split_independent_of_chunking(
        text in arb_tagged_text(),
        cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..6),
    ) {
        let mut points: Vec<usize> = cuts.iter().map(|c| c.index(text.len() + 1)).collect();
        points.sort_unstable();
        points.dedup();

        let mut chunks = Vec::new();
        let mut start = 0;
        for point in points {
            chunks.push(&text[start..point]);
            start = point;
        }
        chunks.push(&text[start..]);

        prop_assert_eq!(run_parser(&chunks), run_parser(&[text.as_str()]));
    }

    #[test]
    fn prop_untagged_text_passes_through(text in "[a-z .,!?]{0,40}") {
        let (thinking, out) = run_parser(&[text.as_str()]);
        prop_assert!(thinking.is_empty());
        prop_assert_eq!(out, text);
    }
}

// =============================================================================
// Cost arithmetic
// =============================================================================

proptest! {
    #[test]
    fn prop_cost_is_additive(
        a in (0u64..2_000_000, 0u64..2_000_000, 0u64..2_000_000, 0u64..2_000_000),
        b in (0u64..2_000_000, 0u64..2_000_000, 0u64..2_000_000, 0u64..2_000_000),
    ) {
        let model = target();
        let mut first = usage(a.0, a.1, a.2, a.3);
        let mut second = usage(b.0, b.1, b.2, b.3);
        let mut both = usage(a.0 + b.0, a.1 + b.1, a.2 + b.2, a.3 + b.3);

        let separate =
            calculate_cost(&model, &mut first).total + calculate_cost(&model, &mut second).total;
        let combined = calculate_cost(&model, &mut both).total;
        prop_assert!((combined - separate).abs() <= 1e-9 * combined.max(1.0));
    }

    #[test]
    fn prop_cost_total_is_sum_of_parts(
        tokens in (0u64..5_000_000, 0u64..5_000_000, 0u64..5_000_000, 0u64..5_000_000),
    ) {
        let mut usage = usage(tokens.0, tokens.1, tokens.2, tokens.3);
        let cost = calculate_cost(&target(), &mut usage);
        prop_assert!(cost.total >= 0.0);
        let parts = cost.input + cost.output + cost.cache_read + cost.cache_write;
        prop_assert!((cost.total - parts).abs() < 1e-12);
        prop_assert_eq!(usage.cost, cost);
    }
}

// =============================================================================
// Image sanitizing
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_sanitizer_enforces_byte_cap(
        sizes in prop::collection::vec(0usize..4096, 1..8),
        cap in 1u64..4096,
    ) {
        let images: Vec<Content> = sizes
            .iter()
            .map(|&n| Content::image(STANDARD.encode(vec![7u8; n]), "image/png"))
            .collect();
        let history = vec![Message::user_blocks(images)];
        let config = SanitizeConfig {
            provider_label: "test".to_string(),
            max_bytes: cap,
            max_dimension: None,
            many_image_limit: None,
            max_images: None,
        };

        let out = sanitize_images(&history, &config);
        let kept: Vec<usize> = out.messages[0]
            .content()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                Content::Image(image) => decode_base64(&image.data).map(|b| b.len()),
                _ => None,
            })
            .collect();

        prop_assert!(kept.iter().all(|&n| n as u64 <= cap));
        prop_assert_eq!(kept.len(), sizes.iter().filter(|&&n| n as u64 <= cap).count());
        prop_assert_eq!(out.note.is_some(), sizes.iter().any(|&n| n as u64 > cap));
    }
}
