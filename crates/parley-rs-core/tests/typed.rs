//! Typed generation through the orchestrator.

use parley_rs_config::GatewayConfig;
use parley_rs_core::{
    Collaborators, GatewayError, InMemoryStore, Orchestrator, ProviderAdapter, ProviderError,
    ProviderKind, RequestContext,
};
use parley_rs_protocol::{ErrorKind, GenerateRequest, RateLimitStatus};
use parley_rs_test_utils::{ScriptedProvider, factory_for};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::sync::Arc;

fn setup(adapter: Arc<dyn ProviderAdapter>) -> (Orchestrator, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let orchestrator = Orchestrator::new(
        GatewayConfig::default(),
        Collaborators::in_memory(store.clone()),
    )
    .expect("orchestrator");
    for kind in ProviderKind::ALL {
        orchestrator.register_provider(kind, factory_for(adapter.clone()));
    }
    (orchestrator, store)
}

fn ctx() -> RequestContext {
    RequestContext::new("u1", "p1", Some(RateLimitStatus::Ok))
}

fn person_schema() -> Value {
    json!({ "name": "string", "age": "number", "tags": ["string"] })
}

#[tokio::test]
async fn conforming_first_answer_takes_one_attempt() {
    let provider = Arc::new(ScriptedProvider::new(vec![Ok(
        "```json\n{\"name\":\"Ada\",\"age\":36,\"tags\":[\"math\"]}\n```",
    )]));
    let (orchestrator, store) = setup(provider.clone());

    let typed = orchestrator
        .generate_typed(&ctx(), &person_schema(), "Invent a mathematician")
        .await
        .expect("typed");

    assert_eq!(
        typed.value,
        json!({ "name": "Ada", "age": 36, "tags": ["math"] })
    );
    assert_eq!(typed.attempts, 1);
    assert_eq!(provider.calls(), 1);
    assert_eq!(store.request_logs().len(), 1);
    assert_eq!(typed.token_usage.output, store.request_logs()[0].output_tokens);
}

#[tokio::test]
async fn missing_field_costs_an_attempt() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Ok("{\"name\":\"Ada\",\"tags\":[]}"),
        Ok("{\"name\":\"Ada\",\"age\":36,\"tags\":[]}"),
    ]));
    let (orchestrator, store) = setup(provider.clone());

    let typed = orchestrator
        .generate_typed(&ctx(), &person_schema(), "Invent a mathematician")
        .await
        .expect("typed");

    assert_eq!(typed.attempts, 2);
    assert_eq!(provider.calls(), 2);
    assert_eq!(store.request_logs().len(), 2);
    let logged: u32 = store
        .request_logs()
        .iter()
        .map(|log| log.input_tokens)
        .sum();
    assert_eq!(typed.token_usage.input, logged);
}

#[tokio::test]
async fn exhaustion_pairs_sentinel_with_failure() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Err(ProviderError::Transport("reset".to_string())),
        Ok("not json at all"),
        Ok("{\"name\":1,\"age\":2,\"tags\":[]}"),
        Ok("[]"),
        Ok("{\"age\":3}"),
        Ok("{\"name\":\"late\",\"age\":1,\"tags\":[]}"),
    ]));
    let (orchestrator, store) = setup(provider.clone());

    let err = orchestrator
        .generate_typed(&ctx(), &person_schema(), "Invent a mathematician")
        .await
        .expect_err("exhausted");

    assert_eq!(provider.calls(), 5);
    assert_eq!(err.kind(), ErrorKind::GenerationFailed);
    assert_eq!(
        err.failure_payload(),
        Some(&json!({ "error": "generation_failed" }))
    );
    match err {
        GatewayError::GenerationFailed(failure) => {
            assert_eq!(failure.attempts, 5);
            assert_eq!(store.request_logs().len(), 4);
            assert_eq!(
                failure.usage.output,
                store
                    .request_logs()
                    .iter()
                    .map(|log| log.output_tokens)
                    .sum::<u32>()
            );
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn generate_with_schema_returns_parsed_value() {
    let provider = Arc::new(ScriptedProvider::new(vec![Ok("{\"ok\":true}")]));
    let (orchestrator, _store) = setup(provider);
    let mut request = GenerateRequest::new("Is water wet?").with_model("best");
    request.type_schema = Some(json!({ "ok": "boolean" }));

    let response = orchestrator.generate(&ctx(), request).await.expect("generate");

    assert_eq!(response.result, json!({ "ok": true }));
}

#[tokio::test]
async fn unusable_schema_makes_no_provider_call() {
    let provider = Arc::new(ScriptedProvider::new(vec![Ok("{}")]));
    let (orchestrator, _store) = setup(provider.clone());

    let err = orchestrator
        .generate_typed(&ctx(), &json!({ "tags": ["string", "number"] }), "List tags")
        .await
        .expect_err("invalid schema");

    assert_eq!(err.kind(), ErrorKind::InputInvalid);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn typed_generation_is_rate_limited() {
    let provider = Arc::new(ScriptedProvider::new(vec![Ok("{\"ok\":true}")]));
    let (orchestrator, _store) = setup(provider.clone());
    let limited = RequestContext::new("u1", "p1", Some(RateLimitStatus::UserReached));

    let err = orchestrator
        .generate_typed(&limited, &json!({ "ok": "boolean" }), "Is water wet?")
        .await
        .expect_err("limited");

    assert_eq!(err.kind(), ErrorKind::RateLimitReached);
    assert_eq!(provider.calls(), 0);
}
