use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use voicelive_bridge::tools::{
    ARGUMENT_DECODE_FAILURE, FixedClock, KeywordCatalog, PRODUCT_INFORMATION, SeededRandom, USER_INFORMATION, UserInfo,
};
use voicelive_bridge::{Error, ToolRegistry};

#[derive(Debug, Deserialize, JsonSchema)]
struct SumArgs {
    a: i32,
    b: i32,
}

fn seeded(seed: u64) -> UserInfo {
    UserInfo::new(
        Arc::new(FixedClock(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap())),
        Arc::new(SeededRandom::new(seed)),
    )
}

/// Pull the date and amount back out of a lookup result.
fn parse_lookup(text: &str) -> (NaiveDate, f64) {
    let (date, amount) = text
        .strip_prefix("Data de vencimento: ")
        .and_then(|rest| rest.split_once(", Valor da fatura: R$ "))
        .unwrap();
    (NaiveDate::parse_from_str(date, "%d/%m/%Y").unwrap(), amount.parse().unwrap())
}

#[test]
fn seeded_user_info_is_reproducible() {
    let first: Vec<String> = (0..5).map(|_| seeded(7)).map(|info| info.lookup()).collect();
    let second: Vec<String> = (0..5).map(|_| seeded(7)).map(|info| info.lookup()).collect();
    assert_eq!(first, second);
}

#[test]
fn user_info_stays_in_range() {
    let info = seeded(42);
    let today = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
    for _ in 0..200 {
        let text = info.lookup();
        let (due, amount) = parse_lookup(&text);
        let days = (due - today).num_days();
        assert!((0..=90).contains(&days), "{text}");
        assert!((100.0..=5000.0).contains(&amount), "{text}");
        let cents = text.rsplit('.').next().unwrap();
        assert_eq!(cents.len(), 2, "{text}");
    }
}

#[tokio::test]
async fn standard_registry_exposes_both_tools() {
    let registry = ToolRegistry::standard(Arc::new(KeywordCatalog::default()), seeded(1));
    assert_eq!(registry.len(), 2);
    assert!(registry.contains(USER_INFORMATION));
    assert!(registry.contains(PRODUCT_INFORMATION));

    let tools = serde_json::to_value(registry.as_tools().unwrap()).unwrap();
    for tool in tools.as_array().unwrap() {
        assert_eq!(tool["type"], "function");
        assert_eq!(tool["parameters"]["type"], "object");
        assert!(tool["parameters"]["properties"]["query"].is_object());
    }

    let out = registry.invoke(PRODUCT_INFORMATION, json!({ "query": "Quais as TAXAS?" })).await.unwrap();
    assert!(out.starts_with("[taxas]: As taxas do cartão"));

    let none = registry.invoke(PRODUCT_INFORMATION, json!({ "query": "seguro viagem" })).await.unwrap();
    assert_eq!(none, "");
}

#[tokio::test]
async fn unknown_and_malformed_calls() {
    let registry = ToolRegistry::standard(Arc::new(KeywordCatalog::default()), seeded(1));

    let err = registry.invoke("transfer_money", json!({})).await.unwrap_err();
    assert!(matches!(err, Error::UnknownFunction(ref name) if name == "transfer_money"));
    assert_eq!(err.to_string(), "Unknown function: transfer_money");

    let out = registry.invoke(USER_INFORMATION, Value::String("not json".to_string())).await.unwrap();
    assert_eq!(out, ARGUMENT_DECODE_FAILURE);

    let err = registry.invoke(PRODUCT_INFORMATION, json!({ "q": "limite" })).await.unwrap_err();
    assert!(matches!(err, Error::Execution(_)));
}

#[tokio::test]
async fn custom_tools_can_be_added_and_replaced() {
    let mut registry = ToolRegistry::new();
    assert!(registry.is_empty());

    registry.tool("sum", "Add two integers.", |args: SumArgs| async move { Ok::<_, Error>((args.a + args.b).to_string()) });
    assert_eq!(registry.invoke("sum", json!({ "a": 2, "b": 3 })).await.unwrap(), "5");

    registry.tool("sum", "Always fails.", |_args: SumArgs| async move {
        Err::<String, _>(Error::Execution("index unavailable".to_string()))
    });
    assert_eq!(registry.len(), 1);
    let err = registry.invoke("sum", json!({ "a": 1, "b": 1 })).await.unwrap_err();
    assert_eq!(err.to_string(), "index unavailable");
    assert_eq!(registry.lookup("sum").unwrap().description.as_deref(), Some("Always fails."));
}
