//! End-to-end tests for the multiplier learner

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::fs;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use gate_learner::clock::ManualClock;
    use gate_learner::config::{default_families, GateFamilyConfig};
    use gate_learner::errors::{LearnerError, LearnerResult};
    use gate_learner::history::{CsvTradeHistory, InMemoryTradeHistory};
    use gate_learner::learner::{FamilyStatus, MultiplierLearner, RetryPolicy};
    use gate_learner::store::{
        DocumentStore, GateMultipliers, JsonFileStore, LearnedMultiplier, MultiplierDocument,
    };
    use gate_learner::types::{ClosedTrade, GateStates};

    fn temp_dir(test_name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "gate_learner_it_{}_{}",
            test_name,
            uuid::Uuid::new_v4()
        ))
    }

    fn run_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 2, 0, 0).unwrap()
    }

    fn no_backoff(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            backoff: std::time::Duration::ZERO,
        }
    }

    /// Builds trades tagged with one state per family
    struct TradeFactory {
        next_id: usize,
        trades: Vec<ClosedTrade>,
    }

    impl TradeFactory {
        fn new() -> Self {
            Self {
                next_id: 0,
                trades: Vec::new(),
            }
        }

        fn add(&mut self, tags: &[(&str, &str)], pnl: f64, hours_ago: i64) -> &mut Self {
            self.next_id += 1;
            let exit = run_time() - Duration::hours(hours_ago);
            self.trades.push(ClosedTrade {
                trade_id: format!("T{:05}", self.next_id),
                symbol: "BTC".into(),
                strategy: "momentum".into(),
                entry_time: exit - Duration::minutes(20),
                exit_time: exit,
                pnl,
                roi: pnl / 20.0,
                gate_states: tags
                    .iter()
                    .map(|(f, s)| (f.to_string(), s.to_string()))
                    .collect::<GateStates>(),
            });
            self
        }

        fn add_many(&mut self, tags: &[(&str, &str)], pnls: &[f64]) -> &mut Self {
            for (i, pnl) in pnls.iter().enumerate() {
                self.add(tags, *pnl, 6 + i as i64);
            }
            self
        }

        fn build(&self) -> Vec<ClosedTrade> {
            self.trades.clone()
        }
    }

    fn learner(
        trades: Vec<ClosedTrade>,
        store: Arc<dyn DocumentStore>,
        families: Vec<GateFamilyConfig>,
    ) -> MultiplierLearner {
        MultiplierLearner::new(
            Arc::new(InMemoryTradeHistory::new(trades)),
            store,
            families,
            Arc::new(ManualClock::new(run_time())),
        )
        .with_retry(no_backoff(3))
    }

    /// Fails every write for one family, delegates everything else
    struct FailingFamilyStore {
        inner: JsonFileStore,
        failing_family: String,
    }

    impl DocumentStore for FailingFamilyStore {
        fn load(&self, policy: &GateFamilyConfig) -> LearnerResult<MultiplierDocument> {
            self.inner.load(policy)
        }

        fn save(&self, doc: &MultiplierDocument) -> LearnerResult<()> {
            if doc.family == self.failing_family {
                return Err(LearnerError::Io(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "store rejected write",
                )));
            }
            self.inner.save(doc)
        }
    }

    // ============================================================================
    // Scenarios
    // ============================================================================

    #[test]
    fn test_loss_streak_scenario() {
        let dir = temp_dir("loss_streak");
        let store = Arc::new(JsonFileStore::new(&dir));

        // 10 trades, 2 wins, avg P&L -0.30
        let mut pnls = vec![0.5, 0.5];
        pnls.extend(std::iter::repeat(-0.5).take(8));
        let trades = TradeFactory::new()
            .add_many(&[("streak", "loss_streak_3")], &pnls)
            .build();

        let summary = learner(trades, store.clone(), vec![GateFamilyConfig::new("streak")])
            .run(Duration::days(7));

        assert_eq!(summary.families_succeeded, 1);
        assert_eq!(summary.states_updated, 1);

        let update = &summary.family("streak").unwrap().updates[0];
        assert_eq!(update.state, "loss_streak_3");
        assert_eq!(update.sample_size, 10);
        assert!((update.win_rate - 0.2).abs() < 1e-12);
        assert!((update.avg_pnl + 0.30).abs() < 1e-12);
        assert_eq!(update.previous, 1.0);
        assert!(update.raw_target < 1.0, "poor performance must target below 1.0");
        assert!(update.smoothed < update.previous);
        assert!(update.smoothed > update.raw_target);

        let doc = store.load(&GateFamilyConfig::new("streak")).unwrap();
        let stored = doc.get("loss_streak_3").unwrap();
        assert_eq!(stored.value, update.smoothed);
        assert_eq!(stored.sample_size, 10);
        assert_eq!(stored.updated_at, run_time());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_zero_trade_family_is_data_unavailable() {
        let dir = temp_dir("no_data");
        let store = Arc::new(JsonFileStore::new(&dir));

        let regime = GateFamilyConfig::new("regime");
        let mut existing = MultiplierDocument::empty(&regime);
        existing.merge(
            &regime,
            vec![(
                "mismatch".to_string(),
                LearnedMultiplier {
                    value: 0.55,
                    updated_at: run_time() - Duration::days(3),
                    sample_size: 14,
                },
            )],
            run_time() - Duration::days(3),
        );
        store.save(&existing).unwrap();
        let before = fs::read(store.path_for("regime")).unwrap();

        // Trades only for another family
        let trades = TradeFactory::new()
            .add_many(&[("streak", "win_streak_2")], &[1.0; 6])
            .build();

        let summary = learner(
            trades,
            store.clone(),
            vec![regime.clone(), GateFamilyConfig::new("streak")],
        )
        .run(Duration::days(7));

        assert!(matches!(
            summary.family("regime").unwrap().status,
            FamilyStatus::DataUnavailable { .. }
        ));
        assert_eq!(summary.families_unavailable, 1);
        assert_eq!(summary.families_succeeded, 1);
        assert_eq!(fs::read(store.path_for("regime")).unwrap(), before);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_single_write_failure_is_isolated() {
        let dir = temp_dir("write_failure");
        let store = Arc::new(FailingFamilyStore {
            inner: JsonFileStore::new(&dir),
            failing_family: "fee_drag".into(),
        });

        let mut factory = TradeFactory::new();
        for family in default_families() {
            factory.add_many(&[(family.name.as_str(), "tier_a")], &[1.0, -0.4, 0.8, 0.3, -0.2]);
        }

        let summary = learner(factory.build(), store, default_families()).run(Duration::days(7));

        assert_eq!(summary.families_attempted, 5);
        assert_eq!(summary.families_succeeded, 4);
        assert_eq!(summary.families_failed, 1);
        assert_eq!(summary.failed_families(), vec!["fee_drag"]);
        assert_eq!(summary.states_updated, 4);
        assert!(!summary.is_clean());

        let reader = JsonFileStore::new(&dir);
        assert!(!reader.path_for("fee_drag").exists());
        for family in ["streak", "regime", "roi_threshold", "intelligence_conflict"] {
            assert!(reader.path_for(family).exists(), "{} should be written", family);
        }

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_corrupt_trades_do_not_abort_family() {
        let dir = temp_dir("corrupt_mixed");
        let store = Arc::new(JsonFileStore::new(&dir));

        let mut factory = TradeFactory::new();
        factory.add_many(&[("regime", "match")], &[1.0, 0.6, -0.3, 0.9, 0.4, 0.2]);
        // Non-finite P&L, tagged in two families
        factory.add(&[("regime", "match"), ("streak", "win_streak_1")], f64::NAN, 3);
        factory.add(&[("regime", "match")], f64::INFINITY, 4);
        // Control character in the state label
        factory.add(&[("regime", "mat\u{1b}ch")], 0.5, 5);

        let families = vec![GateFamilyConfig::new("regime"), GateFamilyConfig::new("streak")];
        let summary = learner(factory.build(), store.clone(), families).run(Duration::days(7));

        let regime = summary.family("regime").unwrap();
        assert_eq!(regime.status, FamilyStatus::Succeeded);
        assert_eq!(regime.trades_considered, 6);
        assert_eq!(regime.corrupt_records, 3);
        assert_eq!(regime.states_updated, 1);
        assert_eq!(summary.corrupt_records, 3);
        assert!(summary.is_clean());

        let doc = store.load(&GateFamilyConfig::new("regime")).unwrap();
        let learned = doc.get("match").unwrap();
        assert_eq!(learned.sample_size, 6);
        assert!(learned.value.is_finite() && learned.value > 1.0);

        let _ = fs::remove_dir_all(&dir);
    }

    // ============================================================================
    // Properties
    // ============================================================================

    #[test]
    fn test_insufficient_state_keeps_stored_multiplier() {
        let dir = temp_dir("insufficient");
        let store = Arc::new(JsonFileStore::new(&dir));
        let policy = GateFamilyConfig::new("streak");

        let earlier = run_time() - Duration::days(1);
        let mut existing = MultiplierDocument::empty(&policy);
        existing.merge(
            &policy,
            vec![(
                "loss_streak_5".to_string(),
                LearnedMultiplier {
                    value: 0.42,
                    updated_at: earlier,
                    sample_size: 9,
                },
            )],
            earlier,
        );
        store.save(&existing).unwrap();

        // 4 trades < min_samples for loss_streak_5, 5 for win_streak_1
        let trades = TradeFactory::new()
            .add_many(&[("streak", "loss_streak_5")], &[2.0, 2.0, 2.0, 2.0])
            .add_many(&[("streak", "win_streak_1")], &[1.0, 1.0, -1.0, 1.0, 0.5])
            .build();

        let summary =
            learner(trades, store.clone(), vec![policy.clone()]).run(Duration::days(7));
        assert_eq!(summary.states_skipped, 1);
        assert_eq!(summary.states_updated, 1);

        let doc = store.load(&policy).unwrap();
        assert_eq!(
            doc.get("loss_streak_5").unwrap(),
            existing.get("loss_streak_5").unwrap()
        );
        assert!(doc.get("win_streak_1").is_some());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_stored_values_stay_within_bounds() {
        let dir = temp_dir("bounds");
        let store = Arc::new(JsonFileStore::new(&dir));

        let mut tight = GateFamilyConfig::new("roi_threshold");
        tight.lower_bound = 0.5;
        tight.upper_bound = 1.5;
        tight.alpha = 1.0;
        tight.pnl_weight = 0.0;
        let families = vec![tight.clone(), GateFamilyConfig::new("regime")];

        let mut factory = TradeFactory::new();
        for (i, family) in ["roi_threshold", "regime"].into_iter().enumerate() {
            factory
                .add_many(&[(family, "all_wins")], &[5.0; 8])
                .add_many(&[(family, "all_losses")], &[-5.0; 8])
                .add_many(&[(family, "mixed")], &[1.0, -1.0, 2.0, -0.5, 0.1 * i as f64]);
        }

        // Several passes so smoothing compounds
        let learner = learner(factory.build(), store.clone(), families.clone());
        for _ in 0..5 {
            assert!(learner.run(Duration::days(7)).is_clean());
        }

        for policy in &families {
            let doc = store.load(policy).unwrap();
            assert_eq!(doc.len(), 3);
            for (state, learned) in &doc.multipliers {
                assert!(
                    learned.value >= policy.lower_bound && learned.value <= policy.upper_bound,
                    "{}/{} = {} escaped bounds",
                    policy.name,
                    state,
                    learned.value
                );
            }
        }

        let roi = store.load(&tight).unwrap();
        assert_eq!(roi.get("all_wins").unwrap().value, 1.5);
        assert_eq!(roi.get("all_losses").unwrap().value, 0.5);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_document_roundtrip_is_byte_exact() {
        let dir = temp_dir("roundtrip");
        let store = JsonFileStore::new(&dir);
        let policy = GateFamilyConfig::new("intelligence_conflict");

        let mut doc = MultiplierDocument::empty(&policy);
        doc.merge(
            &policy,
            [
                ("agree", 1.0 / 3.0 + 1.0),
                ("conflict_minor", 0.1 + 0.2),
                ("conflict_major", 0.123456789012345),
            ]
            .iter()
            .map(|(state, value)| {
                (
                    state.to_string(),
                    LearnedMultiplier {
                        value: *value,
                        updated_at: run_time(),
                        sample_size: 11,
                    },
                )
            }),
            run_time(),
        );
        store.save(&doc).unwrap();
        let first = fs::read(store.path_for("intelligence_conflict")).unwrap();

        let loaded = store.load(&policy).unwrap();
        assert_eq!(loaded.multipliers, doc.multipliers);

        store.save(&loaded).unwrap();
        let second = fs::read(store.path_for("intelligence_conflict")).unwrap();
        assert_eq!(first, second);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_concurrent_reads_never_see_torn_documents() {
        let dir = temp_dir("concurrent");
        let store = Arc::new(JsonFileStore::new(&dir));
        let policy = GateFamilyConfig::new("regime");
        store.save(&MultiplierDocument::empty(&policy)).unwrap();

        let done = Arc::new(AtomicBool::new(false));
        let readers: Vec<_> = (0..3)
            .map(|_| {
                let store = Arc::clone(&store);
                let policy = policy.clone();
                let done = Arc::clone(&done);
                std::thread::spawn(move || {
                    let mut reads = 0usize;
                    while !done.load(Ordering::Acquire) {
                        let doc = store.load(&policy).expect("reader saw a torn document");
                        doc.validate().expect("reader saw an invalid document");
                        reads += 1;
                    }
                    reads
                })
            })
            .collect();

        for round in 0..200 {
            let mut doc = MultiplierDocument::empty(&policy);
            doc.merge(
                &policy,
                (0..(1 + round % 40)).map(|i| {
                    (
                        format!("state_{:03}", i),
                        LearnedMultiplier {
                            value: 0.1 + (i as f64 % 19.0) * 0.1,
                            updated_at: run_time(),
                            sample_size: 5 + i,
                        },
                    )
                }),
                run_time(),
            );
            store.save(&doc).unwrap();
        }
        done.store(true, Ordering::Release);

        for reader in readers {
            let reads = reader.join().expect("reader thread panicked");
            assert!(reads > 0);
        }

        let _ = fs::remove_dir_all(&dir);
    }

    // ============================================================================
    // CSV history -> store -> gate reader
    // ============================================================================

    #[test]
    fn test_csv_history_feeds_gate_reader() {
        let dir = temp_dir("csv_pipeline");
        let history = Arc::new(CsvTradeHistory::new(dir.join("data")));
        let store = Arc::new(JsonFileStore::new(dir.join("multipliers")));

        let trades = TradeFactory::new()
            .add_many(
                &[("regime", "match"), ("fee_drag", "low")],
                &[1.2, 0.8, 1.5, -0.3, 0.9, 1.1],
            )
            .add_many(&[("regime", "mismatch")], &[-1.0, -0.8, -1.3, 0.2, -0.9])
            .add(&[("regime", "match")], 50.0, 24 * 30)
            .build();
        for trade in &trades {
            history.record(trade).unwrap();
        }

        let families = vec![GateFamilyConfig::new("regime"), GateFamilyConfig::new("fee_drag")];
        let clock = Arc::new(ManualClock::new(run_time()));
        let learner = MultiplierLearner::new(
            history,
            store.clone(),
            families.clone(),
            clock.clone(),
        )
        .with_retry(no_backoff(1));

        let summary = learner.run(Duration::days(7));
        assert!(summary.is_clean());
        assert_eq!(summary.families_succeeded, 2);
        assert_eq!(summary.family("regime").unwrap().trades_considered, 11);
        assert_eq!(summary.states_updated, 3);

        let gates = GateMultipliers::new(store, &families, Duration::minutes(5), clock);
        let matched = gates.get("regime", "match");
        let mismatched = gates.get("regime", "mismatch");
        assert!(matched.is_learned && mismatched.is_learned);
        assert!(matched.value > 1.0);
        assert!(mismatched.value < 1.0);
        assert!(gates.get_multiplier("fee_drag", "low") > 1.0);

        let unseen = gates.get("fee_drag", "high");
        assert!(!unseen.is_learned);
        assert_eq!(unseen.value, 1.0);

        let _ = fs::remove_dir_all(&dir);
    }
}
