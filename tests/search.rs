#[path = "common/mod.rs"]
mod common;

use ahash::AHashSet;
use common::*;
use pshharvest::{
    AuthorDirectory, AuthorRecord, BulkDoc, HarvestOptions, IndexedAuthors, MatchConfig, MatchCriteria, SearchClient,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

const T0: i64 = 1_400_000_000;

fn client(url: String) -> SearchClient {
    pshharvest::init_tracing_once();
    SearchClient::new(&HarvestOptions::default().with_search_url(url)).unwrap()
}

fn in_range(doc: &Value, filter: &Value) -> bool {
    let Some((field, bounds)) = filter["range"].as_object().and_then(|r| r.iter().next()) else { return true };
    let v = doc[field].as_i64().unwrap();
    bounds["gte"].as_i64().map_or(true, |lo| v >= lo) && bounds["lte"].as_i64().map_or(true, |hi| v <= hi)
}

/// Accounts index answering candidate queries: range filters, `must_not` terms on the
/// exact username, ascending `acc_id` with `search_after`. Records every request body.
fn serve_accounts(accounts: Vec<AuthorRecord>, requests: Arc<Mutex<Vec<Value>>>) -> String {
    let docs: Vec<Value> = accounts.iter().map(|a| serde_json::to_value(a).unwrap()).collect();
    serve_json(move |_, _, body| {
        let q: Value = serde_json::from_str(body).unwrap();
        requests.lock().unwrap().push(q.clone());
        let filters = q["query"]["bool"]["filter"].as_array().cloned().unwrap_or_default();
        let banned: Vec<&str> = q["query"]["bool"]["must_not"][0]["terms"]["username"]
            .as_array()
            .map(|a| a.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();
        let after = q["search_after"][0].as_i64();
        let size = q["size"].as_u64().unwrap() as usize;

        let mut hits: Vec<&Value> = docs
            .iter()
            .filter(|d| filters.iter().all(|f| in_range(d, f)))
            .filter(|d| !banned.contains(&d["username"].as_str().unwrap()))
            .filter(|d| after.map_or(true, |a| d["acc_id"].as_i64().unwrap() > a))
            .collect();
        hits.sort_by_key(|d| d["acc_id"].as_i64().unwrap());
        hits.truncate(size);
        let hits: Vec<Value> = hits.into_iter().map(|d| json!({"_source": d, "sort": [d["acc_id"]]})).collect();
        json!({"hits": {"hits": hits}})
    })
}

/// Excluded accounts whose stored username differs in case slip past `must_not`; paging
/// continues past them to the eligible account.
#[test]
fn indexed_candidates_page_past_excluded_accounts() {
    let mut accounts: Vec<AuthorRecord> = (0..5).map(|i| author(i, &format!("Excl{i}"), T0, 100, 100)).collect();
    accounts.push(author(10, "eligible", T0, 100, 100));
    accounts.push(author(11, "too_old", T0 - 400 * 86_400, 100, 100));
    let requests = Arc::new(Mutex::new(Vec::new()));
    let client = client(serve_accounts(accounts, Arc::clone(&requests)));
    let directory = IndexedAuthors::new(&client, "accounts");

    let criteria = MatchCriteria::for_author(&author(99, "case", T0, 100, 100), &MatchConfig::default());
    let excluded: AHashSet<String> = (0..5).map(|i| format!("excl{i}")).collect();
    let found = directory.find_candidates(&criteria, &excluded, 2).unwrap();

    assert_eq!(found.iter().map(|a| a.username.as_str()).collect::<Vec<_>>(), vec!["eligible"]);
    let requests = requests.lock().unwrap();
    assert!(requests.len() >= 3, "expected several pages, got {}", requests.len());
    assert!(requests[0].get("search_after").is_none());
    assert_eq!(requests[1]["search_after"], json!([1]));
}

/// Rejected bulk items are counted, accepted ones indexed.
#[test]
fn bulk_index_counts_rejected_items() {
    let bodies = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&bodies);
    let url = serve_json(move |method, target, body| {
        seen.lock().unwrap().push((method.to_string(), target.to_string(), body.to_string()));
        json!({"errors": true, "items": [
            {"index": {"status": 201}},
            {"index": {"status": 400, "error": {"type": "mapper_parsing_exception"}}}
        ]})
    });
    let client = client(url);

    let docs = vec![
        BulkDoc { id: Some("7".into()), source: json!({"username": "a"}) },
        BulkDoc { id: None, source: json!({"username": "b"}) },
    ];
    let outcome = client.bulk_index("accounts", &docs).unwrap();
    assert_eq!((outcome.indexed, outcome.failed), (1, 1));

    let bodies = bodies.lock().unwrap();
    let (method, target, body) = &bodies[0];
    assert_eq!((method.as_str(), target.as_str()), ("POST", "/_bulk"));
    let lines: Vec<Value> = body.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    assert_eq!(lines[0], json!({"index": {"_index": "accounts", "_id": "7"}}));
    assert_eq!(lines[2], json!({"index": {"_index": "accounts"}}));
    assert_eq!(lines.len(), 4);
}
