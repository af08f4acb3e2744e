#[path = "common/mod.rs"]
mod common;

use common::*;
use pshharvest::{HarvestOptions, PostSource, PushshiftClient, SubmissionQuery};
use serde_json::{json, Value};

/// Stand-in for `/reddit/search/submission`: newest first, exclusive
/// `after`/`before`, at most `size` posts per page.
fn serve(posts: Vec<Value>) -> String {
    serve_json(move |_, target, _| {
        let after = query_param(target, "after");
        let before = query_param(target, "before");
        let size = query_param(target, "size").unwrap_or(100) as usize;

        let mut page: Vec<&Value> = posts
            .iter()
            .filter(|p| {
                let ts = p["created_utc"].as_i64().unwrap();
                after.map_or(true, |a| ts > a) && before.map_or(true, |b| ts < b)
            })
            .collect();
        page.sort_by_key(|p| std::cmp::Reverse(p["created_utc"].as_i64().unwrap()));
        page.truncate(size);
        json!({ "data": page })
    })
}

/// Several posts in the same second straddle a page break; every one of them is
/// delivered exactly once.
#[test]
fn paging_keeps_posts_sharing_the_edge_second() {
    let posts = vec![
        post("a", "u", "news", 500, "t"),
        post("b", "u", "news", 400, "t"),
        post("c", "u", "news", 400, "t"),
        post("d", "u", "news", 400, "t"),
        post("e", "u", "news", 300, "t"),
    ];
    let url = serve(posts);
    pshharvest::init_tracing_once();
    let client = PushshiftClient::new(&HarvestOptions::default().with_api_url(url).with_page_size(2)).unwrap();

    let mut ids = Vec::new();
    let delivered = client
        .search_submissions(&SubmissionQuery::new(), &mut |p| {
            ids.push(p["id"].as_str().unwrap().to_string());
            Ok(true)
        })
        .unwrap();

    assert_eq!(delivered, 5);
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(sorted, vec!["a", "b", "c", "d", "e"]);
    assert_eq!(ids.first().map(String::as_str), Some("a"));
    assert_eq!(ids.last().map(String::as_str), Some("e"));
}

/// `limit` stops the stream mid-page.
#[test]
fn paging_honours_limit() {
    let url = serve((0..10).map(|i| post(&format!("p{i}"), "u", "news", 100 + i, "t")).collect());
    pshharvest::init_tracing_once();
    let client = PushshiftClient::new(&HarvestOptions::default().with_api_url(url).with_page_size(4)).unwrap();

    let mut ids = Vec::new();
    let delivered = client
        .search_submissions(&SubmissionQuery::new().before(108).limit(5), &mut |p| {
            ids.push(p["id"].as_str().unwrap().to_string());
            Ok(true)
        })
        .unwrap();
    assert_eq!(delivered, 5);
    assert_eq!(ids, vec!["p7", "p6", "p5", "p4", "p3"]);
}
