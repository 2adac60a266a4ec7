//! Local model server backend against the mock server

mod harness;

use std::sync::Arc;

use cadence_config::Config;
use cadence_llm::{
    ChatOptions, EmbedOptions, FinishReason, LlmClient, Message, OllamaBackend, TimeoutConfig, Tool, Usage,
};
use futures_util::StreamExt;
use harness::{fast_retry, mock_llm::MockLlm, tools::Calculator};
use indoc::formatdoc;
use serde_json::json;
use url::Url;

fn client_for(mock: &MockLlm) -> LlmClient {
    let url = Url::parse(&mock.ollama_url()).unwrap();
    let backend = OllamaBackend::with_base_url(&url, &TimeoutConfig::default()).unwrap();

    LlmClient::builder(Arc::new(backend)).retry(fast_retry(0)).build()
}

#[tokio::test]
async fn streams_thinking_before_content() {
    let mock = MockLlm::start_with_response("Paris is the capital").await.unwrap();
    let client = client_for(&mock);

    let chunks: Vec<_> = client
        .stream_chat(
            "qwen3",
            vec![Message::user("Capital of France?")],
            Vec::new(),
            ChatOptions::default().think(true),
        )
        .unwrap()
        .map(Result::unwrap)
        .collect()
        .await;

    assert_eq!(chunks[0].thinking(), Some("Let me think."));
    let content: String = chunks.iter().filter_map(|chunk| chunk.content()).collect();
    assert_eq!(content, "Paris is the capital");

    let terminal = chunks.last().unwrap();
    assert!(terminal.done);
    assert_eq!(terminal.finish_reason, Some(FinishReason::Stop));
    assert_eq!(terminal.usage, Some(Usage::new(10, 5)));
    assert_eq!(chunks.iter().filter(|chunk| chunk.done).count(), 1);

    assert_eq!(mock.requests()[0]["think"], true);
}

#[tokio::test]
async fn think_flag_is_omitted_unless_requested() {
    let mock = MockLlm::start().await.unwrap();
    let client = client_for(&mock);

    let response = client
        .chat_response("qwen3", vec![Message::user("hi")], Vec::new(), ChatOptions::default())
        .await
        .unwrap();

    assert_eq!(response.thinking, None);
    assert!(mock.requests()[0].get("think").is_none());
}

#[tokio::test]
async fn tool_results_are_sent_back_by_name() {
    let mock = MockLlm::builder()
        .tool_call("add", r#"{"a": 2, "b": 3}"#)
        .start()
        .await
        .unwrap();
    let client = client_for(&mock);
    let calculator = Calculator::new();

    let response = client
        .chat_response(
            "qwen3",
            vec![Message::user("What is 2 + 3?")],
            vec![calculator.clone() as Arc<dyn Tool>],
            ChatOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(response.content, "The result is 5.");
    assert_eq!(response.rounds, 2);
    assert_eq!(calculator.invocations(), 1);

    let requests = mock.requests();
    assert_eq!(requests[0]["tools"][0]["function"]["name"], "add");

    let history = requests[1]["messages"].as_array().unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[1]["tool_calls"][0]["function"]["arguments"], json!({"a": 2, "b": 3}));
    assert_eq!(history[2]["role"], "tool");
    assert_eq!(history[2]["content"], "5");
    assert_eq!(history[2]["tool_name"], "add");
}

#[tokio::test]
async fn remembers_name_across_turns() {
    let mock = MockLlm::start().await.unwrap();
    let client = client_for(&mock);

    let mut history = vec![
        Message::system("You are a helpful assistant."),
        Message::user("My name is Alice."),
    ];
    let first = client
        .chat_response("llama3.2", history.clone(), Vec::new(), ChatOptions::default())
        .await
        .unwrap();
    history.push(first.to_message().unwrap());
    history.push(Message::user("What is my name?"));

    let second = client
        .chat_response("llama3.2", history, Vec::new(), ChatOptions::default())
        .await
        .unwrap();

    assert!(second.content.contains("Alice"), "got {:?}", second.content);
    assert_eq!(mock.requests()[1]["messages"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn embeddings_use_embed_endpoint() {
    let mock = MockLlm::start().await.unwrap();
    let client = client_for(&mock);

    let vectors = client
        .embed(
            "nomic-embed-text",
            &["hi".to_owned(), "there".to_owned()],
            EmbedOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(vectors, vec![vec![2.0, 0.0, 0.5], vec![5.0, 1.0, 0.5]]);
    assert_eq!(mock.embedding_count(), 1);
    assert_eq!(mock.chat_count(), 0);
}

#[tokio::test]
async fn client_from_config_file_settings() {
    let mock = MockLlm::start_with_response("Configured").await.unwrap();

    let toml = formatdoc! {r#"
        [backend]
        type = "ollama"
        base_url = "{url}"
        default_model = "llama3.2"
        keep_alive = "1m"

        [retry]
        max_attempts = 1
        initial_delay = "10ms"

        [cache]
        enabled = true
        capacity = 4
        ttl = "1m"
    "#, url = mock.ollama_url()};

    let config = Config::from_toml(&toml).unwrap();
    let client = LlmClient::from_config(&config).unwrap();
    assert_eq!(client.backend().name(), "ollama");

    let model = config.backend.default_model().unwrap();
    for _ in 0..2 {
        let response = client
            .chat_response(model, vec![Message::user("hi")], Vec::new(), ChatOptions::default())
            .await
            .unwrap();
        assert_eq!(response.content, "Configured");
    }

    // The second answer came from the cache
    assert_eq!(mock.chat_count(), 1);
    assert_eq!(mock.requests()[0]["keep_alive"], "1m");
}
