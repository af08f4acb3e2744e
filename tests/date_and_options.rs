use pshharvest::{add_days, days_between, from_iso, hour_and_month, sub_days, to_iso, HarvestOptions, SortOrder};
use std::time::Duration;

#[test]
fn iso_round_trip_and_offsets() {
    assert_eq!(to_iso(1_136_073_600), "2006-01-01T00:00:00");
    assert_eq!(from_iso("2006-01-01T00:00:00").unwrap(), 1_136_073_600);
    assert_eq!(from_iso("2006-01-01T01:00:00+01:00").unwrap(), 1_136_073_600);
    assert_eq!(from_iso("2006-01-01T00:00:00Z").unwrap(), 1_136_073_600);
    assert!(from_iso("yesterday").is_err());
}

/// Non-positive day counts leave the date untouched.
#[test]
fn day_arithmetic() {
    let t = 1_136_073_600;
    assert_eq!(add_days(t, 2), t + 2 * 86_400);
    assert_eq!(sub_days(t, 2), t - 2 * 86_400);
    assert_eq!(add_days(t, 0), t);
    assert_eq!(sub_days(t, -5), t);
    assert_eq!(days_between(t, add_days(t, 30)), 30);
    assert_eq!(hour_and_month(t + 13 * 3_600 + 45 * 86_400), Some((13, 2)));
}

#[test]
fn options_builder() {
    let o = HarvestOptions::default()
        .with_api_url(" https://example.org/api/ ")
        .with_search_url("http://es:9200/")
        .with_page_size(5_000)
        .with_request_timeout(Duration::from_secs(5))
        .with_io_buffers(1, 1 << 20);

    assert_eq!(o.api_url, "https://example.org/api");
    assert_eq!(o.search_url, "http://es:9200");
    assert_eq!(o.page_size, 1000);
    assert_eq!(o.request_timeout, Duration::from_secs(5));
    assert_eq!(o.read_buffer_bytes, 8 * 1024);
    assert_eq!(o.write_buffer_bytes, 1 << 20);
    assert_eq!(SortOrder::Desc.as_str(), "desc");
}
