//! 流水线集成测试：综述阈值、重入保护、失败策略、篇间限流、提交原子性、定时入口鉴权

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use zeitgeist::core::{CycleOutcome, Pipeline, PipelineError, PipelineSettings, PipelineStatus};
    use zeitgeist::model::{Article, PhilosophicalSummary, Story};
    use zeitgeist::providers::{
        placeholder_image, ComposeProvider, ImageChain, MockJournalist, MockPhilosopher, MockResearcher,
        Providers, ResearchProvider, StockPhotoProvider, SynthesisProvider, TextGenerator,
    };
    use zeitgeist::store::{MemoryStore, SqliteStore, Store};
    use zeitgeist::trigger::CronTrigger;

    /// 返回固定故事列表，可选延迟或失败
    struct ScriptedResearcher {
        stories: Vec<Story>,
        delay: Duration,
        fail: bool,
        calls: AtomicUsize,
    }

    impl ScriptedResearcher {
        fn topics(topics: &[&str]) -> Self {
            Self {
                stories: topics
                    .iter()
                    .map(|t| Story::new(*t, format!("{} is reshaping the world.", t)))
                    .collect(),
                delay: Duration::ZERO,
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ResearchProvider for ScriptedResearcher {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn research(&self) -> Result<Vec<Story>, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(PipelineError::Research("search backend unavailable".into()));
            }
            Ok(self.stories.clone())
        }
    }

    /// 对指定 topic 失败，其余交给 MockJournalist
    struct FlakyJournalist {
        failing_topic: &'static str,
    }

    #[async_trait]
    impl ComposeProvider for FlakyJournalist {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn compose(&self, story: &Story) -> Result<Article, PipelineError> {
            if story.topic == self.failing_topic {
                return Err(PipelineError::Compose(format!("model refused: {}", story.topic)));
            }
            MockJournalist.compose(story).await
        }
    }

    struct BrokenPhilosopher {
        called: AtomicBool,
    }

    #[async_trait]
    impl SynthesisProvider for BrokenPhilosopher {
        fn name(&self) -> &str {
            "broken"
        }

        async fn synthesize(&self, _articles: &[Article]) -> Result<PhilosophicalSummary, PipelineError> {
            self.called.store(true, Ordering::SeqCst);
            Err(PipelineError::Synthesis("empty response".into()))
        }
    }

    /// 需要限流的文本后端
    struct MeteredText;

    #[async_trait]
    impl TextGenerator for MeteredText {
        fn name(&self) -> &str {
            "metered"
        }

        async fn generate_text(&self, _prompt: &str) -> Result<String, PipelineError> {
            Ok("Energy, Policy, Climate".into())
        }
    }

    /// 委托给 MemoryStore，但写 lastUpdated 总是失败
    #[derive(Default)]
    struct ClocklessStore {
        inner: MemoryStore,
    }

    #[async_trait]
    impl Store for ClocklessStore {
        async fn get_all_articles(&self, limit: usize) -> Result<Vec<Article>, PipelineError> {
            self.inner.get_all_articles(limit).await
        }

        async fn save_articles(&self, batch: &[Article]) -> Result<(), PipelineError> {
            self.inner.save_articles(batch).await
        }

        async fn commit_articles(&self, batch: &[Article]) -> Result<u64, PipelineError> {
            self.inner.commit_articles(batch).await
        }

        async fn get_last_updated(&self) -> Result<Option<DateTime<Utc>>, PipelineError> {
            self.inner.get_last_updated().await
        }

        async fn set_last_updated(&self, _at: DateTime<Utc>) -> Result<(), PipelineError> {
            Err(PipelineError::Persistence("system_state is read-only".into()))
        }

        async fn get_all_summaries(&self, limit: usize) -> Result<Vec<PhilosophicalSummary>, PipelineError> {
            self.inner.get_all_summaries(limit).await
        }

        async fn save_summary(&self, summary: &PhilosophicalSummary) -> Result<(), PipelineError> {
            self.inner.save_summary(summary).await
        }

        async fn save_summary_and_reset_counter(&self, summary: &PhilosophicalSummary) -> Result<(), PipelineError> {
            self.inner.save_summary_and_reset_counter(summary).await
        }

        async fn get_summary_by_id(&self, id: &str) -> Result<Option<PhilosophicalSummary>, PipelineError> {
            self.inner.get_summary_by_id(id).await
        }

        async fn get_articles_since_last_summary(&self) -> Result<u64, PipelineError> {
            self.inner.get_articles_since_last_summary().await
        }

        async fn set_articles_since_last_summary(&self, value: u64) -> Result<(), PipelineError> {
            self.inner.set_articles_since_last_summary(value).await
        }

        async fn increment_articles_since_last_summary(&self, by: u64) -> Result<u64, PipelineError> {
            self.inner.increment_articles_since_last_summary(by).await
        }

        async fn get_articles_by_ids(&self, ids: &[String]) -> Result<Vec<Article>, PipelineError> {
            self.inner.get_articles_by_ids(ids).await
        }
    }

    fn delayed(secs: u64) -> PipelineSettings {
        PipelineSettings {
            story_delay: Duration::from_secs(secs),
            ..PipelineSettings::immediate()
        }
    }

    fn providers(
        research: Arc<dyn ResearchProvider>,
        compose: Arc<dyn ComposeProvider>,
        synthesis: Arc<dyn SynthesisProvider>,
    ) -> Providers {
        Providers {
            research,
            compose,
            synthesis,
            text: None,
            images: Arc::new(ImageChain::new(Arc::new(StockPhotoProvider), Duration::from_secs(1))),
        }
    }

    fn completed(outcome: CycleOutcome) -> zeitgeist::core::CycleReport {
        match outcome {
            CycleOutcome::Completed(report) => report,
            CycleOutcome::Skipped => panic!("cycle unexpectedly skipped"),
        }
    }

    #[tokio::test]
    async fn test_counter_crossing_threshold_fires_and_resets() {
        let store = Arc::new(MemoryStore::new());
        store.set_articles_since_last_summary(5).await.unwrap();
        let pipeline = Pipeline::new(
            providers(
                Arc::new(ScriptedResearcher::topics(&["Ocean heat", "Chip export rules"])),
                Arc::new(MockJournalist),
                Arc::new(MockPhilosopher),
            ),
            store.clone(),
            PipelineSettings::immediate(),
        );

        let report = completed(pipeline.run_cycle(pipeline.interactive_options()).await.unwrap());
        assert_eq!(report.articles_added, 2);
        assert!(report.philosophical_summary);
        assert_eq!(store.get_articles_since_last_summary().await.unwrap(), 0);

        let summaries = store.get_all_summaries(10).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(Some(&summaries[0].id), report.summary_id.as_ref());
        assert_eq!(summaries[0].article_ids.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_synthesis_keeps_counter_and_completes() {
        let store = Arc::new(MemoryStore::new());
        store.set_articles_since_last_summary(5).await.unwrap();
        let philosopher = Arc::new(BrokenPhilosopher {
            called: AtomicBool::new(false),
        });
        let pipeline = Pipeline::new(
            providers(
                Arc::new(ScriptedResearcher::topics(&["Ocean heat", "Chip export rules"])),
                Arc::new(MockJournalist),
                philosopher.clone(),
            ),
            store.clone(),
            PipelineSettings::immediate(),
        );

        let report = completed(pipeline.run_cycle(pipeline.interactive_options()).await.unwrap());
        assert!(philosopher.called.load(Ordering::SeqCst));
        assert_eq!(report.articles_added, 2);
        assert!(!report.philosophical_summary);
        assert_eq!(store.article_count().await, 2);
        assert_eq!(store.get_articles_since_last_summary().await.unwrap(), 7);
        assert!(store.get_all_summaries(10).await.unwrap().is_empty());
        assert_eq!(pipeline.status().status, PipelineStatus::Idle);
    }

    #[tokio::test]
    async fn test_synthesis_uses_most_recent_articles_across_runs() {
        let store = Arc::new(MemoryStore::new());
        let mut older = Vec::new();
        for topic in ["First", "Second", "Third", "Fourth"] {
            older.push(MockJournalist.compose(&Story::new(topic, "earlier coverage")).await.unwrap());
        }
        store.save_articles(&older).await.unwrap();
        store.set_articles_since_last_summary(4).await.unwrap();

        let pipeline = Pipeline::new(
            providers(
                Arc::new(ScriptedResearcher::topics(&["Fifth", "Sixth", "Seventh"])),
                Arc::new(MockJournalist),
                Arc::new(MockPhilosopher),
            ),
            store.clone(),
            PipelineSettings::immediate(),
        );
        let report = completed(pipeline.run_cycle(pipeline.interactive_options()).await.unwrap());
        assert!(report.philosophical_summary);

        let summary = store.get_all_summaries(1).await.unwrap().remove(0);
        assert_eq!(summary.article_ids.len(), 6);
        let ids: HashSet<&str> = summary.article_ids.iter().map(String::as_str).collect();
        assert!(!ids.contains(older[0].id.as_str()));
        for article in &older[1..] {
            assert!(ids.contains(article.id.as_str()));
        }
        assert!(summary.date_range.start <= summary.date_range.end);
        assert_eq!(store.get_articles_since_last_summary().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_trigger_is_skipped() {
        let store = Arc::new(MemoryStore::new());
        let mut slow = ScriptedResearcher::topics(&["Slow news"]);
        slow.delay = Duration::from_millis(300);
        let researcher = Arc::new(slow);
        let pipeline = Arc::new(Pipeline::new(
            providers(researcher.clone(), Arc::new(MockJournalist), Arc::new(MockPhilosopher)),
            store.clone(),
            PipelineSettings::immediate(),
        ));

        let first = {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move { pipeline.run_cycle(pipeline.interactive_options()).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(pipeline.is_busy());

        let second = pipeline.run_cycle(pipeline.interactive_options()).await.unwrap();
        assert!(matches!(second, CycleOutcome::Skipped));
        let injected = pipeline.inject_story(Story::new("Walk-in", "while busy")).await;
        assert_eq!(injected.unwrap_err(), PipelineError::Busy);

        let report = completed(first.await.unwrap().unwrap());
        assert_eq!(report.articles_added, 1);
        assert_eq!(researcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.article_count().await, 1);
    }

    #[tokio::test]
    async fn test_unauthorized_cron_runs_nothing() {
        let store = Arc::new(MemoryStore::new());
        let researcher = Arc::new(ScriptedResearcher::topics(&["Anything"]));
        let pipeline = Arc::new(Pipeline::new(
            providers(researcher.clone(), Arc::new(MockJournalist), Arc::new(MockPhilosopher)),
            store.clone(),
            PipelineSettings::immediate(),
        ));

        let trigger = CronTrigger::new(Arc::clone(&pipeline), Some("right".into()));
        assert!(trigger.handle(Some("Bearer wrong")).await.is_err());
        assert!(trigger.handle(None).await.is_err());

        let unconfigured = CronTrigger::new(Arc::clone(&pipeline), None);
        assert!(unconfigured.handle(Some("Bearer ")).await.is_err());

        assert_eq!(researcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.article_count().await, 0);
        assert!(store.get_last_updated().await.unwrap().is_none());
        assert_eq!(pipeline.status().status, PipelineStatus::Idle);
    }

    #[tokio::test]
    async fn test_scheduled_path_continues_past_story_failure() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = Arc::new(Pipeline::new(
            providers(
                Arc::new(ScriptedResearcher::topics(&["Alpha", "Beta", "Gamma"])),
                Arc::new(FlakyJournalist { failing_topic: "Beta" }),
                Arc::new(MockPhilosopher),
            ),
            store.clone(),
            PipelineSettings::immediate(),
        ));

        let trigger = CronTrigger::new(Arc::clone(&pipeline), Some("right".into()));
        let response = trigger.handle(Some("Bearer right")).await.unwrap();
        assert!(response.success);
        assert_eq!(response.status_code, 200);
        assert_eq!(response.articles_added, Some(2));
        assert_eq!(response.philosophical_summary, Some(false));

        let titles: HashSet<String> = store
            .get_all_articles(10)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.title)
            .collect();
        assert_eq!(titles, HashSet::from(["Alpha".to_string(), "Gamma".to_string()]));
        assert_eq!(store.get_articles_since_last_summary().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_interactive_path_aborts_on_story_failure() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = Pipeline::new(
            providers(
                Arc::new(ScriptedResearcher::topics(&["Alpha", "Beta", "Gamma"])),
                Arc::new(FlakyJournalist { failing_topic: "Beta" }),
                Arc::new(MockPhilosopher),
            ),
            store.clone(),
            PipelineSettings::immediate(),
        );

        let err = pipeline.run_cycle(pipeline.interactive_options()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Compose(_)));
        assert_eq!(store.article_count().await, 0);
        assert_eq!(store.get_articles_since_last_summary().await.unwrap(), 0);
        assert!(store.get_last_updated().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_research_failure_shows_error_then_returns_to_idle() {
        let store = Arc::new(MemoryStore::new());
        let mut failing = ScriptedResearcher::topics(&[]);
        failing.fail = true;
        let settings = PipelineSettings {
            error_cooldown: Duration::from_millis(100),
            ..PipelineSettings::immediate()
        };
        let pipeline = Pipeline::new(
            providers(Arc::new(failing), Arc::new(MockJournalist), Arc::new(MockPhilosopher)),
            store.clone(),
            settings,
        );
        let mut status = pipeline.subscribe();

        let err = pipeline.run_cycle(pipeline.scheduled_options()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Research(_)));
        assert_eq!(pipeline.status().status, PipelineStatus::Error);
        assert!(pipeline.is_busy());

        tokio::time::timeout(Duration::from_secs(2), async {
            while status.borrow_and_update().status != PipelineStatus::Idle {
                status.changed().await.unwrap();
            }
        })
        .await
        .unwrap();
        assert!(!pipeline.is_busy());
        assert_eq!(store.article_count().await, 0);
    }

    #[tokio::test]
    async fn test_no_stories_completes_with_zero_articles() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = Pipeline::new(
            providers(
                Arc::new(ScriptedResearcher::topics(&[])),
                Arc::new(MockJournalist),
                Arc::new(MockPhilosopher),
            ),
            store.clone(),
            PipelineSettings::immediate(),
        );
        let report = completed(pipeline.run_cycle(pipeline.scheduled_options()).await.unwrap());
        assert_eq!(report.articles_added, 0);
        assert!(store.get_last_updated().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_mock_backends_are_deterministic() {
        let first = MockResearcher.research().await.unwrap();
        let second = MockResearcher.research().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);

        let a = MockJournalist.compose(&first[0]).await.unwrap();
        let b = MockJournalist.compose(&first[0]).await.unwrap();
        assert_eq!(a.title, b.title);
        assert_eq!(a.sections, b.sections);
        assert_ne!(a.id, b.id);

        assert_eq!(placeholder_image("Quantum chips"), placeholder_image("Quantum chips"));
        assert!(placeholder_image("Quantum chips").starts_with("https://picsum.photos/seed/"));
    }

    #[tokio::test]
    async fn test_sqlite_upsert_is_idempotent() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = SqliteStore::open(dir.path().join("zeitgeist.sqlite")).await.unwrap();
        let article = MockJournalist.compose(&Story::new("Repeat", "saved twice")).await.unwrap();

        store.save_articles(std::slice::from_ref(&article)).await.unwrap();
        store.save_articles(std::slice::from_ref(&article)).await.unwrap();

        let all = store.get_all_articles(50).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0], article);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_path_waits_between_stories() {
        let pipeline = Pipeline::new(
            providers(
                Arc::new(ScriptedResearcher::topics(&["Alpha", "Beta", "Gamma"])),
                Arc::new(MockJournalist),
                Arc::new(MockPhilosopher),
            ),
            Arc::new(MemoryStore::new()),
            delayed(10),
        );

        let start = tokio::time::Instant::now();
        let report = completed(pipeline.run_cycle(pipeline.scheduled_options()).await.unwrap());
        let elapsed = start.elapsed();
        assert_eq!(report.articles_added, 3);
        assert!(elapsed >= Duration::from_secs(20), "waited only {elapsed:?}");
        assert!(elapsed < Duration::from_secs(30), "waited {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_interactive_path_never_waits() {
        let pipeline = Pipeline::new(
            providers(
                Arc::new(ScriptedResearcher::topics(&["Alpha", "Beta", "Gamma"])),
                Arc::new(MockJournalist),
                Arc::new(MockPhilosopher),
            ),
            Arc::new(MemoryStore::new()),
            delayed(10),
        );

        let start = tokio::time::Instant::now();
        let report = completed(pipeline.run_cycle(pipeline.interactive_options()).await.unwrap());
        assert_eq!(report.articles_added, 3);
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_free_backends_skip_scheduled_wait() {
        let pipeline = Pipeline::new(Providers::mock(), Arc::new(MemoryStore::new()), delayed(10));

        let start = tokio::time::Instant::now();
        let report = completed(pipeline.run_cycle(pipeline.scheduled_options()).await.unwrap());
        assert_eq!(report.articles_added, 3);
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_metered_text_backend_keeps_scheduled_wait() {
        let mut mocks = Providers::mock();
        mocks.text = Some(Arc::new(MeteredText));
        let pipeline = Pipeline::new(mocks, Arc::new(MemoryStore::new()), delayed(10));

        let start = tokio::time::Instant::now();
        let report = completed(pipeline.run_cycle(pipeline.scheduled_options()).await.unwrap());
        assert_eq!(report.articles_added, 3);
        assert!(start.elapsed() >= Duration::from_secs(20));
    }

    #[tokio::test]
    async fn test_last_updated_failure_keeps_committed_count() {
        let store = Arc::new(ClocklessStore::default());
        let pipeline = Pipeline::new(
            providers(
                Arc::new(ScriptedResearcher::topics(&["Alpha", "Beta", "Gamma"])),
                Arc::new(MockJournalist),
                Arc::new(MockPhilosopher),
            ),
            store.clone(),
            PipelineSettings::immediate(),
        );

        let report = completed(pipeline.run_cycle(pipeline.interactive_options()).await.unwrap());
        assert_eq!(report.articles_added, 3);
        assert_eq!(store.inner.article_count().await, 3);
        assert_eq!(store.get_articles_since_last_summary().await.unwrap(), 3);
        assert!(store.get_last_updated().await.unwrap().is_none());
        assert_eq!(pipeline.status().status, PipelineStatus::Idle);
    }

    #[tokio::test]
    async fn test_rejected_row_rolls_back_whole_batch() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("zeitgeist.sqlite");
        let store = Arc::new(SqliteStore::open(&path).await.unwrap());
        store.increment_articles_since_last_summary(2).await.unwrap();

        let admin = sqlx::SqlitePool::connect(&format!("sqlite:{}", path.display()))
            .await
            .unwrap();
        sqlx::query(
            "CREATE TRIGGER reject_poison BEFORE INSERT ON articles WHEN NEW.title = 'Poison'
             BEGIN SELECT RAISE(ABORT, 'rejected row'); END",
        )
        .execute(&admin)
        .await
        .unwrap();
        admin.close().await;

        let pipeline = Pipeline::new(
            providers(
                Arc::new(ScriptedResearcher::topics(&["Alpha", "Poison", "Gamma"])),
                Arc::new(MockJournalist),
                Arc::new(MockPhilosopher),
            ),
            store.clone(),
            PipelineSettings::immediate(),
        );

        let err = pipeline.run_cycle(pipeline.interactive_options()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Persistence(_)));
        assert!(store.get_all_articles(50).await.unwrap().is_empty());
        assert_eq!(store.get_articles_since_last_summary().await.unwrap(), 2);
        assert!(store.get_last_updated().await.unwrap().is_none());
    }
}
