//! Tool Schema Bridge Integration Tests
//!
//! Describing tools, coercing parsed calls and formatting results

mod common;

use common::{collect_events, create_test_tools, streaming_helpers::create_realistic_chunks};
use serde_json::{json, Value};
use tool_bridge::{
    build_system_prompt, describe_tools, format_tool_call, format_tool_result, parse_complete,
    schema::render_tool_call, CallError, ParsedResponse, PromptOptions, StreamEvent, ToolResult,
    ToolSet,
};

#[test]
fn test_well_typed_arguments_survive_round_trip() {
    let tools = create_test_tools();
    let cases = vec![
        (
            "getWeather",
            json!({"city": "Tokyo", "units": "celsius", "days": 3}),
        ),
        (
            "search",
            json!({"query": "a < b && c > d", "max_results": 5, "safe": false}),
        ),
        (
            "book_hotel",
            json!({
                "hotel": "Grand \"Palace\" & Spa",
                "stay": {"check_in": "2024-05-01", "nights": 2},
                "guests": ["ann", {"name": "bo", "age": 7}],
                "budget": 99.5
            }),
        ),
        (
            "getWeather",
            json!({"city": "\nindented\n", "units": "fahrenheit"}),
        ),
        ("search", json!({"query": "\r\ntwo\nlines\r"})),
        (
            "book_hotel",
            json!({"hotel": "\n", "stay": {"check_in": "\n2024-05-01"}}),
        ),
    ];

    for (name, arguments) in cases {
        let markup = render_tool_call(name, arguments.as_object().unwrap());
        let events = collect_events(&create_realistic_chunks(&markup), tools.clone());
        let response = ParsedResponse::from_events(events);

        assert_eq!(response.tool_calls.len(), 1, "markup: {}", markup);
        let call = &response.tool_calls[0];
        assert_eq!(call.name, name);
        assert!(call.is_valid(), "{:?}", call.error);
        assert_eq!(call.arguments, arguments);
    }
}

#[test]
fn test_format_tool_call_reparses_identically() {
    let tools = create_test_tools();
    let original = "<tool_call name=\"search\">\n<parameter name=\"query\">fish &amp; chips</parameter>\n<parameter name=\"max_results\">2</parameter>\n</tool_call>";
    let first = ParsedResponse::from_events(parse_complete(original, tools.clone()));
    let call = &first.tool_calls[0];

    let replayed = format_tool_call(call);
    assert_eq!(replayed, original);

    let second = ParsedResponse::from_events(parse_complete(&replayed, tools));
    assert_eq!(second.tool_calls, first.tool_calls);
    assert_eq!(call.arguments, json!({"query": "fish & chips", "max_results": 2}));
    assert_eq!(call.arguments_json(), r#"{"query":"fish & chips","max_results":2}"#);
}

#[test]
fn test_system_prompt_format_is_recognized() {
    let tools = create_test_tools();
    let prompt = build_system_prompt(&tools, &PromptOptions::default());

    for tool in tools.iter() {
        assert!(prompt.contains(&format!("<tool name=\"{}\">", tool.name)));
    }

    // The example call in the instructions must parse as exactly one call
    let response = ParsedResponse::from_events(parse_complete(&prompt, ToolSet::empty()));
    assert_eq!(response.tool_calls.len(), 1);
    assert_eq!(response.tool_calls[0].name, "TOOL_NAME");
    assert_eq!(response.tool_calls[0].error, Some(CallError::UnknownTool));
    assert_eq!(
        response.tool_calls[0].arguments,
        json!({"PARAMETER_NAME": "value"})
    );
    assert!(response.error.is_none());
}

#[test]
fn test_thinking_budget_prompt_uses_recognized_tag() {
    let options = PromptOptions {
        thinking_budget: Some(1024),
    };
    let prompt = build_system_prompt(&create_test_tools(), &options);
    let response = ParsedResponse::from_events(parse_complete(&prompt, ToolSet::empty()));
    assert_eq!(response.thinking, "...");
}

#[test]
fn test_describe_tools_lists_metadata_in_order() {
    let described = describe_tools(&create_test_tools());
    let weather = described.find("<tool name=\"getWeather\">").unwrap();
    let search = described.find("<tool name=\"search\">").unwrap();
    let hotel = described.find("<tool name=\"book_hotel\">").unwrap();
    assert!(weather < search && search < hotel);

    assert!(described.contains(
        "<param name=\"city\" type=\"string\" required=\"true\" description=\"City name\"/>"
    ));
    assert!(described.contains(
        "<param name=\"units\" type=\"string\" required=\"false\" enum=\"celsius|fahrenheit\"/>"
    ));
    assert!(described.contains("<param name=\"check_in\" type=\"string\" required=\"true\"/>"));
}

#[test]
fn test_missing_required_parameter_reported() {
    let events = parse_complete(
        "<tool_call name=\"search\"><parameter name=\"max_results\">3</parameter></tool_call>",
        create_test_tools(),
    );
    let response = ParsedResponse::from_events(events);
    assert_eq!(
        response.tool_calls[0].error,
        Some(CallError::InvalidArgument {
            parameter: "query".to_string(),
            reason: "missing required parameter".to_string(),
        })
    );
    assert_eq!(response.tool_calls[0].arguments, json!({"max_results": 3}));
}

#[test]
fn test_enum_violation_is_non_fatal() {
    let events = parse_complete(
        "<tool_call name=\"getWeather\"><parameter name=\"city\">Oslo</parameter><parameter name=\"units\">kelvin</parameter></tool_call>after",
        create_test_tools(),
    );
    let end = events
        .iter()
        .find_map(|event| match event {
            StreamEvent::ToolCallEnd {
                error, arguments, ..
            } => Some((error.clone(), arguments.clone())),
            _ => None,
        })
        .unwrap();
    assert!(matches!(
        end.0,
        Some(CallError::InvalidArgument { ref parameter, .. }) if parameter == "units"
    ));
    assert_eq!(end.1["units"], Value::from("kelvin"));
    assert!(events.contains(&StreamEvent::TextDelta {
        text: "after".to_string()
    }));
}

#[test]
fn test_tool_result_for_parsed_call() {
    let response = ParsedResponse::from_events(parse_complete(
        "<tool_call name=\"getWeather\"><parameter name=\"city\">Tokyo</parameter></tool_call>",
        create_test_tools(),
    ));
    let call = &response.tool_calls[0];

    let ok = ToolResult::success(call.id, &call.name, json!({"temp_c": 21, "sky": "clear"}));
    assert_eq!(
        format_tool_result(&ok),
        "<tool_result id=\"1\" name=\"getWeather\" status=\"success\">\n{\"temp_c\":21,\"sky\":\"clear\"}\n</tool_result>"
    );

    let failed = ToolResult::error(call.id, &call.name, "service <unavailable>");
    assert_eq!(
        format_tool_result(&failed),
        "<tool_result id=\"1\" name=\"getWeather\" status=\"error\">\nservice &lt;unavailable&gt;\n</tool_result>"
    );
}
