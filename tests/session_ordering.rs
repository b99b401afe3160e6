//! End-to-end turns through the public API: per-session ordering,
//! cross-session concurrency, retry behavior and grounded answers.

use async_trait::async_trait;
use finance_assistant::llm::{GenerateOptions, LanguageModelProvider, TextGenerator};
use finance_assistant::memory::{Role, SessionStore};
use finance_assistant::rag::{HashingEmbedder, KnowledgeBase, Retriever, SharedIndex};
use finance_assistant::retry::RetryPolicy;
use finance_assistant::router::Router;
use finance_assistant::state::InMemoryTranscriptStore;
use finance_assistant::{build_handlers, Assistant, AssistantError, IntentKind, TurnSettings};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Echoes the question back after a fixed delay, throttling the first
/// `throttle` calls.
struct SlowEcho {
    delay: Duration,
    throttle: usize,
    calls: AtomicUsize,
}

impl SlowEcho {
    fn new(delay: Duration, throttle: usize) -> Self {
        Self {
            delay,
            throttle,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl LanguageModelProvider for SlowEcho {
    fn name(&self) -> &str {
        "slow-echo"
    }

    async fn generate(
        &self,
        prompt: &str,
        _options: &GenerateOptions,
    ) -> finance_assistant::Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if call < self.throttle {
            return Err(AssistantError::RateLimited("slow down".into()));
        }
        let question = prompt.rsplit("Question:\n").next().unwrap_or(prompt);
        Ok(format!("echo: {}", question))
    }
}

async fn assistant(model: Arc<SlowEcho>) -> Assistant {
    let policy = RetryPolicy {
        max_attempts: 4,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        timeout: Duration::from_secs(5),
    };
    let generator = TextGenerator::new(model, policy.clone());
    let router = Router::new(build_handlers(generator, None, Vec::new())).unwrap();

    let index = Arc::new(SharedIndex::new());
    let corpus = KnowledgeBase::builtin().unwrap();
    index
        .rebuild(corpus.into_articles(), &HashingEmbedder::default(), &policy)
        .await
        .unwrap();

    Assistant::new(
        router,
        Retriever::new(index, Arc::new(HashingEmbedder::default()), policy.clone()),
        Arc::new(SessionStore::new(Duration::from_secs(600))),
        Arc::new(InMemoryTranscriptStore::new()),
        policy,
        TurnSettings::default(),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_session_turns_commit_in_arrival_order() {
    let assistant = Arc::new(assistant(Arc::new(SlowEcho::new(Duration::from_millis(30), 0))).await);

    let mut tasks = Vec::new();
    for i in 0..5 {
        let assistant = assistant.clone();
        tasks.push(tokio::spawn(async move {
            assistant
                .handle_message("shared", &format!("Explain lesson {}", i))
                .await
        }));
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    for task in tasks {
        tokio_test::assert_ok!(task.await.unwrap());
    }

    let session = assistant.sessions().get("shared").await;
    let messages = session.messages();
    assert_eq!(messages.len(), 10);

    for (i, pair) in messages.chunks(2).enumerate() {
        assert_eq!(pair[0].role, Role::User);
        assert_eq!(pair[0].text, format!("Explain lesson {}", i));
        assert_eq!(pair[1].role, Role::Assistant);
        assert!(pair[1].text.starts_with(&format!("echo: Explain lesson {}", i)));
    }
    assert!(messages.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn distinct_sessions_run_concurrently() {
    let delay = Duration::from_millis(200);
    let assistant = Arc::new(assistant(Arc::new(SlowEcho::new(delay, 0))).await);

    let start = Instant::now();
    let mut tasks = Vec::new();
    for i in 0..4 {
        let assistant = assistant.clone();
        tasks.push(tokio::spawn(async move {
            assistant
                .handle_message(&format!("user-{}", i), "Explain dividends")
                .await
        }));
    }
    for task in tasks {
        tokio_test::assert_ok!(task.await.unwrap());
    }

    assert!(start.elapsed() < delay * 3);
    for i in 0..4 {
        let session = assistant.sessions().get(&format!("user-{}", i)).await;
        assert_eq!(session.messages().len(), 2);
    }
}

#[tokio::test]
async fn throttled_provider_recovers_without_partial_commit() {
    let model = Arc::new(SlowEcho::new(Duration::from_millis(1), 3));
    let assistant = assistant(model.clone()).await;

    let turn = assistant
        .handle_message("retry", "Explain compound interest")
        .await
        .unwrap();

    assert_eq!(model.calls.load(Ordering::SeqCst), 4);
    assert!(turn.response_text.starts_with("echo: Explain compound interest"));

    let session = assistant.sessions().get("retry").await;
    assert_eq!(session.messages().len(), 2);
}

#[tokio::test]
async fn stock_question_is_grounded_in_fundamentals() {
    let assistant = assistant(Arc::new(SlowEcho::new(Duration::ZERO, 0))).await;

    let turn = assistant.handle_message("edu", "What is a stock?").await.unwrap();

    assert_eq!(turn.intent, IntentKind::Education);
    assert_eq!(turn.citations[0].article_id, "stocks_101");
    assert!(turn.response_text.contains("Sources:"));
}

#[tokio::test]
async fn portfolio_holdings_are_recorded() {
    let assistant = assistant(Arc::new(SlowEcho::new(Duration::ZERO, 0))).await;

    let turn = assistant
        .handle_message("pf", "Analyze my portfolio: AAPL 10, MSFT 5")
        .await
        .unwrap();

    assert_eq!(turn.intent, IntentKind::Portfolio);
    let portfolio = turn.updated_portfolio.unwrap();
    assert_eq!(portfolio.quantity("AAPL"), Some(10.0));
    assert_eq!(portfolio.quantity("MSFT"), Some(5.0));

    let summary = assistant.session_summary("pf").await.unwrap();
    assert_eq!(summary.portfolio, portfolio);
    assert_eq!(summary.last_intent, Some(IntentKind::Portfolio));
}

#[tokio::test]
async fn advice_questions_do_not_edit_the_portfolio() {
    let assistant = assistant(Arc::new(SlowEcho::new(Duration::ZERO, 0))).await;
    assistant
        .handle_message("advice", "Analyze my portfolio: AAPL 10, MSFT 5")
        .await
        .unwrap();

    for question in [
        "Should I sell AAPL given my portfolio allocation?",
        "Should I sell NVDA or keep my portfolio as is?",
    ] {
        let turn = assistant.handle_message("advice", question).await.unwrap();
        assert!(turn.updated_portfolio.is_none(), "{}", question);
    }

    let summary = assistant.session_summary("advice").await.unwrap();
    assert_eq!(summary.portfolio.quantity("AAPL"), Some(10.0));
    assert_eq!(summary.portfolio.quantity("MSFT"), Some(5.0));
}
