//! Cohort-level scenarios for the sybil heuristics engine.

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use sybil_scorer_heuristics::{
        AnalysisConfig, FeatureAggregator, SimilarityBackend, TransactionStore,
    };
    use sybil_scorer_models::{Transaction, TransactionTable};

    /// Full-length address whose 8-character prefix differs per tag.
    fn addr(tag: u32) -> String {
        format!("0x{:08x}{:032x}", tag.wrapping_mul(2_654_435_761), tag)
    }

    fn tx(hash: String, ts: i64, from: &str, to: &str) -> Transaction {
        Transaction::new(hash, Utc.timestamp_opt(1_650_000_000 + ts, 0).unwrap(), Some(from), Some(to))
            .with_gas(21_000, 30_000)
    }

    fn store(rows: Vec<Transaction>, cohort: &[String]) -> TransactionStore {
        TransactionStore::new(TransactionTable::new(rows), cohort).unwrap()
    }

    fn config(backend: SimilarityBackend) -> AnalysisConfig {
        let mut config = AnalysisConfig::default();
        config.similarity.backend = backend;
        config
    }

    /// Funding from `funder` followed by nine swaps over a fixed DEX set.
    fn scripted_wallet(wallet: &str, funder: &str, dexes: &[String], start: i64) -> Vec<Transaction> {
        let mut rows = vec![tx(format!("{wallet}-fund"), start, funder, wallet)];
        for i in 0..9 {
            let dex = &dexes[i % dexes.len()];
            rows.push(tx(format!("{wallet}-{i}"), start + 1 + i as i64, wallet, dex));
        }
        rows
    }

    #[test]
    fn test_structurally_identical_wallets_are_similar() {
        let funder = addr(1);
        let dexes = vec![addr(2), addr(3), addr(4)];
        let (a, b) = (addr(10), addr(11));
        let mut rows = scripted_wallet(&a, &funder, &dexes, 0);
        rows.extend(scripted_wallet(&b, &funder, &dexes, 1_000));
        let store = store(rows, &[a.clone(), b.clone()]);

        for backend in [SimilarityBackend::NaiveDp, SimilarityBackend::FastPrimitive] {
            let aggregator = FeatureAggregator::new(&store, config(backend)).unwrap();
            let engine = aggregator.similarity_engine();
            let report = engine.similar_to(&a);
            let matched = report.matches[&b];
            assert!(matched.match_length >= 10, "{backend}");
            assert_eq!(matched.score, 1.0);

            let table = aggregator.compute();
            for address in [&a, &b] {
                let row = table.get(address).unwrap();
                assert_eq!(row.transaction_count, 10);
                assert!(row.has_few_transactions);
                assert_eq!(row.has_similarity, Some(true));
                assert_eq!(row.similarity_max_score, Some(1.0));
                assert!(row.has_same_seed);
                assert!(!row.has_suspicious_seed);
            }
        }
    }

    #[test]
    fn test_contract_call_before_funding_is_suspicious() {
        let contract = addr(1);
        let (a, b) = (addr(10), addr(11));
        let rows = vec![
            // a acts before it was ever funded
            tx("0x01".into(), 0, &a, &contract),
            tx("0x02".into(), 5, &contract, &b),
            tx("0x03".into(), 9, &b, &addr(2)),
        ];
        let store = store(rows, &[a.clone(), b.clone()]);
        let aggregator = FeatureAggregator::new(&store, AnalysisConfig::default()).unwrap();

        let seeds = aggregator.seeds();
        assert_eq!(seeds.resolve_naive(&a).unwrap().seed, contract);
        assert!(seeds.resolve_refined(&a).is_none());
        assert!(seeds.same_seed_naive(&a));
        assert!(!seeds.same_seed(&a));
        assert!(seeds.is_suspicious(&a));

        let row = aggregator.compute().get(&a).cloned().unwrap();
        assert!(row.has_suspicious_seed);
        assert!(row.first_incoming.is_none());
        assert_eq!(row.first_outgoing.unwrap().counterparty.as_deref(), Some(contract.as_str()));
    }

    #[test]
    fn test_low_activity_wallet_is_not_compared_with_busy_ones() {
        let dexes = vec![addr(2), addr(3)];
        let quiet = addr(1_000);
        let mut cohort = vec![quiet.clone()];
        let mut rows = vec![
            tx("quiet-0".into(), 0, &addr(1), &quiet),
            tx("quiet-1".into(), 1, &quiet, &dexes[0]),
            tx("quiet-2".into(), 2, &quiet, &dexes[1]),
        ];
        for n in 0..99u32 {
            let busy = addr(2_000 + n);
            for i in 0..300 {
                rows.push(tx(format!("{busy}-{i}"), 10 + i as i64, &busy, &dexes[i % 2]));
            }
            cohort.push(busy);
        }
        let store = store(rows, &cohort);
        let aggregator = FeatureAggregator::new(&store, AnalysisConfig::default()).unwrap();
        let engine = aggregator.similarity_engine();

        let window = engine.shape_window(&quiet);
        assert!(!window.admits(300));
        let report = engine.similar_to(&quiet);
        assert_eq!(report.comparisons, 0);
        assert_eq!(report.pruned, 99);
        assert!(report.matches.is_empty());

        let table = aggregator.compute();
        assert_eq!(table.len(), 100);
        assert_eq!(table.summary().low_activity, 1);
        assert_eq!(table.summary().pruned, 99);
        assert!(table.rows().iter().filter(|r| r.address != quiet).all(|r| r.has_similarity.is_none()));
    }

    #[test]
    fn test_degenerate_addresses_do_not_abort_the_run() {
        let (single, other) = (addr(10), addr(11));
        let ghost = addr(12);
        let rows = vec![
            tx("0x01".into(), 0, &single, &addr(1)),
            tx("0x02".into(), 1, &addr(1), &other),
            Transaction::new("0x03", Utc.timestamp_opt(1_650_000_002, 0).unwrap(), Some(other.as_str()), None),
        ];
        let store = store(rows, &[single.clone(), other.clone(), ghost.clone()]);
        assert!(!store.contains(&ghost));
        for n in 2..6 {
            assert!(store.has_less_than_n_transactions(&single, n));
            assert!(store.has_less_than_n_transactions(&ghost, n));
        }

        let aggregator = FeatureAggregator::new(&store, AnalysisConfig::default()).unwrap();
        let table = aggregator.compute();
        assert_eq!(table.len(), 2);
        assert_eq!(table.summary().dropped_rows, 1);

        let row = table.get(&single).unwrap();
        assert_eq!(row.similarity_cluster_size, Some(0));
        assert_eq!(row.similarity_mean_score, Some(0.0));
        assert_eq!(row.similarity_max_score, Some(0.0));
        assert_eq!(row.has_similarity, Some(false));
        assert!(aggregator.similarity_engine().similar_to(&ghost).matches.is_empty());
    }

    #[test]
    fn test_backends_produce_the_same_clusters() {
        let funders = [addr(1), addr(2)];
        let dexes = vec![addr(3), addr(4), addr(5)];
        let mut rows = Vec::new();
        let mut cohort = Vec::new();
        for n in 0..8u32 {
            let wallet = addr(100 + n);
            rows.extend(scripted_wallet(&wallet, &funders[n as usize % 2], &dexes, n as i64 * 100));
            cohort.push(wallet);
        }
        let store = store(rows, &cohort);

        let dp = FeatureAggregator::new(&store, config(SimilarityBackend::NaiveDp)).unwrap().compute();
        let fast = FeatureAggregator::new(&store, config(SimilarityBackend::FastPrimitive))
            .unwrap()
            .compute();
        for address in &cohort {
            let (x, y) = (&dp.reports()[address], &fast.reports()[address]);
            assert_eq!(x.matches, y.matches, "{address}");
        }
    }

    #[test]
    fn test_suspicious_flag_matches_seed_disagreement_for_every_row() {
        let contract = addr(1);
        let funder = addr(2);
        let mut rows = Vec::new();
        let mut cohort = Vec::new();
        for n in 0..20u32 {
            let wallet = addr(500 + n);
            let t = n as i64 * 10;
            if n % 3 == 0 {
                rows.push(tx(format!("c{n}"), t, &wallet, &contract));
            }
            if n % 2 == 0 {
                rows.push(tx(format!("f{n}"), t + 1, &funder, &wallet));
            } else {
                rows.push(tx(format!("g{n}"), t + 1, &addr(900 + n), &wallet));
            }
            cohort.push(wallet);
        }
        let store = store(rows, &cohort);
        let aggregator = FeatureAggregator::new(&store, AnalysisConfig::default()).unwrap();
        let seeds = aggregator.seeds();
        let table = aggregator.compute();
        for row in table.rows() {
            assert_eq!(
                row.has_suspicious_seed,
                seeds.same_seed(&row.address) != seeds.same_seed_naive(&row.address)
            );
        }

        // a fresh aggregator over the same store resolves every seed the same way
        let rebuilt = FeatureAggregator::new(&store, AnalysisConfig::default()).unwrap();
        for address in &cohort {
            assert_eq!(
                seeds.resolve_refined(address),
                rebuilt.seeds().resolve_refined(address)
            );
        }
        assert_eq!(table.records(), rebuilt.compute().records());
    }

    #[test]
    fn test_self_transfer_wallets_are_similar_under_both_backends() {
        let (a, b) = (addr(20), addr(21));
        let mut rows = Vec::new();
        for (k, wallet) in [&a, &b].into_iter().enumerate() {
            for i in 0..10 {
                rows.push(tx(format!("{wallet}-self-{i}"), (k * 100 + i) as i64, wallet, wallet));
            }
        }
        let store = store(rows, &[a.clone(), b.clone()]);

        let exact = FeatureAggregator::new(&store, config(SimilarityBackend::NaiveDp)).unwrap();
        let linear = FeatureAggregator::new(&store, config(SimilarityBackend::FastPrimitive)).unwrap();
        let (dp, fast) = (exact.similarity_engine(), linear.similarity_engine());
        assert_eq!(dp.compare(&a, &b), 10);
        assert_eq!(fast.compare(&a, &b), 10);
        assert!(dp.similar_to(&a).has_similarity());
        assert_eq!(dp.similar_to(&a), fast.similar_to(&a));
    }
}
