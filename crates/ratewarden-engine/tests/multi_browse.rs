use ratewarden_engine::{Engine, Job};
use ratewarden_policy::Policy;
use ratewarden_stats::Aggregator;
use ratewarden_store::MemoryBackend;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

fn policy_with(content: &str) -> Policy {
    Policy::parse(content, Path::new(".")).unwrap().0
}

fn attrs(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test]
async fn multi_browse_matches_serial_single_browse_for_count() {
    let content = "[result]\n1 : {\"retType\":0,\"retCode\":0,\"errNo\":0,\"errMsg\":\"\",\"strReason\":\"\",\"needVcode\":0,\"vcodeLen\":0,\"vcodeType\":0,\"other\":\"\",\"version\":1}\n2 : {\"retType\":1,\"retCode\":701,\"errNo\":0,\"errMsg\":\"\",\"strReason\":\"\",\"needVcode\":0,\"vcodeLen\":0,\"vcodeType\":0,\"other\":\"\",\"version\":1}\n[rules]\nrule : [count] [uid=+] [time=60; count=2;] [result=2; return=701]\n";
    let policy = policy_with(content);
    let backend = Arc::new(MemoryBackend::new());
    let (agg, sender) = Aggregator::new(64, 0);
    let engine = Engine::new(Arc::clone(&backend), sender, 480);

    let hot = attrs(&[("uid", "u1")]);
    engine.update(&policy, &hot).await;
    engine.update(&policy, &hot).await;

    let jobs = vec![
        Job {
            id: "a".to_string(),
            attrs: hot.clone(),
        },
        Job {
            id: "b".to_string(),
            attrs: attrs(&[("uid", "u2")]),
        },
    ];

    let results = engine.multi_browse(&policy, &jobs).await;
    let by_id: HashMap<_, _> = results.into_iter().map(|r| (r.id, r.result)).collect();

    assert_eq!(by_id["a"].ret_code, 701);
    assert_eq!(by_id["b"].ret_code, 0);

    let single = engine.browse(&policy, &hot, false).await;
    assert_eq!(single.ret_code, by_id["a"].ret_code);

    drop(agg);
}

#[tokio::test]
async fn multi_browse_direct_denies_every_matching_job() {
    let content = "[result]\n1 : {\"retType\":0,\"retCode\":0,\"errNo\":0,\"errMsg\":\"\",\"strReason\":\"\",\"needVcode\":0,\"vcodeLen\":0,\"vcodeType\":0,\"other\":\"\",\"version\":1}\n2 : {\"retType\":1,\"retCode\":801,\"errNo\":0,\"errMsg\":\"\",\"strReason\":\"\",\"needVcode\":0,\"vcodeLen\":0,\"vcodeType\":0,\"other\":\"\",\"version\":1}\n[rules]\nrule : [direct] [banned=+] [] [result=2; return=801]\n";
    let policy = policy_with(content);
    let backend = Arc::new(MemoryBackend::new());
    let (agg, sender) = Aggregator::new(64, 0);
    let engine = Engine::new(backend, sender, 480);

    let jobs = vec![
        Job {
            id: "x".to_string(),
            attrs: attrs(&[("banned", "1")]),
        },
        Job {
            id: "y".to_string(),
            attrs: attrs(&[("other", "1")]),
        },
    ];

    let results = engine.multi_browse(&policy, &jobs).await;
    let by_id: HashMap<_, _> = results.into_iter().map(|r| (r.id, r.result)).collect();
    assert_eq!(by_id["x"].ret_code, 801);
    assert_eq!(by_id["y"].ret_code, 0);

    drop(agg);
}

#[tokio::test]
async fn multi_browse_base_batches_primary_and_secondary_lookups() {
    let content = "[result]\n1 : {\"retType\":0,\"retCode\":0,\"errNo\":0,\"errMsg\":\"\",\"strReason\":\"\",\"needVcode\":0,\"vcodeLen\":0,\"vcodeType\":0,\"other\":\"\",\"version\":1}\n2 : {\"retType\":1,\"retCode\":901,\"errNo\":0,\"errMsg\":\"\",\"strReason\":\"\",\"needVcode\":0,\"vcodeLen\":0,\"vcodeType\":0,\"other\":\"\",\"version\":1}\n[rules]\nrule : [base] [uid=+] [base=1; time=60; count=1;] [result=2; return=901]\n";
    let policy = policy_with(content);
    let backend = Arc::new(MemoryBackend::new());
    let (agg, sender) = Aggregator::new(64, 0);
    let engine = Engine::new(Arc::clone(&backend), sender, 480);

    let over_base = attrs(&[("uid", "u1")]);
    engine.update(&policy, &over_base).await;

    let jobs = vec![
        Job {
            id: "a".to_string(),
            attrs: over_base.clone(),
        },
        Job {
            id: "b".to_string(),
            attrs: attrs(&[("uid", "u2")]),
        },
    ];

    let results = engine.multi_browse(&policy, &jobs).await;
    let by_id: HashMap<_, _> = results.into_iter().map(|r| (r.id, r.result)).collect();

    assert_eq!(by_id["a"].ret_code, 901);
    assert_eq!(by_id["b"].ret_code, 0);

    let single = engine.browse(&policy, &over_base, false).await;
    assert_eq!(single.ret_code, by_id["a"].ret_code);

    drop(agg);
}
