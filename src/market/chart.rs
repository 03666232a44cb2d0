use crate::error::FetchError;
use crate::market::types::{ChartRow, RawChartPayload, RawEvent};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy)]
enum Side {
    Buy,
    Sell,
}

/// Parses a lot count. Blank, unparsable and non-finite values count as zero.
pub fn parse_lot(raw: &str) -> f64 {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .unwrap_or(0.0)
}

/// Merges buy and sell events into one row per time key, ordered by the
/// byte order of the key. Later events overwrite earlier ones on the same side.
pub fn merge(buy: &[RawEvent], sell: &[RawEvent]) -> Vec<ChartRow> {
    let mut buckets: BTreeMap<&str, ChartRow> = BTreeMap::new();
    apply_side(&mut buckets, buy, Side::Buy);
    apply_side(&mut buckets, sell, Side::Sell);
    buckets.into_values().collect()
}

fn apply_side<'a>(buckets: &mut BTreeMap<&'a str, ChartRow>, events: &'a [RawEvent], side: Side) {
    for event in events {
        let row = buckets
            .entry(event.time.as_str())
            .or_insert_with(|| ChartRow {
                time: event.time.clone(),
                buy: None,
                sell: None,
            });
        let lot = parse_lot(&event.lot.raw);
        match side {
            Side::Buy => row.buy = Some(lot),
            Side::Sell => row.sell = Some(lot),
        }
    }
}

pub fn merge_payload(payload: RawChartPayload) -> Result<Vec<ChartRow>, FetchError> {
    let data = payload.data.ok_or_else(|| {
        FetchError::MalformedPayload("chart response has no data object".to_string())
    })?;
    Ok(merge(&data.buy, &data.sell))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::types::{RawChartData, RawMetric};

    fn event(time: &str, lot: &str) -> RawEvent {
        RawEvent {
            time: time.to_string(),
            lot: RawMetric {
                raw: lot.to_string(),
                formatted: None,
            },
            frequency: RawMetric::default(),
        }
    }

    fn row(time: &str, buy: Option<f64>, sell: Option<f64>) -> ChartRow {
        ChartRow {
            time: time.to_string(),
            buy,
            sell,
        }
    }

    #[test]
    fn merges_both_sides_into_shared_buckets() {
        let buy = vec![event("09:00", "100")];
        let sell = vec![event("09:00", "50"), event("09:01", "10")];

        let rows = merge(&buy, &sell);

        assert_eq!(
            rows,
            vec![
                row("09:00", Some(100.0), Some(50.0)),
                row("09:01", None, Some(10.0)),
            ]
        );
    }

    #[test]
    fn sorts_by_time_key_and_keeps_one_row_per_key() {
        let buy = vec![event("09:02", "1"), event("09:00", "2"), event("09:01", "3")];
        let sell = vec![event("09:03", "4"), event("09:00", "5")];

        let rows = merge(&buy, &sell);
        let keys: Vec<&str> = rows.iter().map(|row| row.time.as_str()).collect();

        assert_eq!(keys, vec!["09:00", "09:01", "09:02", "09:03"]);
    }

    #[test]
    fn later_event_wins_within_a_side() {
        let buy = vec![event("10:00", "7"), event("10:00", "9")];

        let rows = merge(&buy, &[]);

        assert_eq!(rows, vec![row("10:00", Some(9.0), None)]);
    }

    #[test]
    fn unparsable_lots_become_zero() {
        let buy = vec![event("10:00", "n/a"), event("10:01", "")];
        let sell = vec![event("10:00", "NaN")];

        let rows = merge(&buy, &sell);

        assert_eq!(
            rows,
            vec![
                row("10:00", Some(0.0), Some(0.0)),
                row("10:01", Some(0.0), None),
            ]
        );
    }

    #[test]
    fn merge_is_repeatable() {
        let buy = vec![event("09:05", "12"), event("09:01", "3")];
        let sell = vec![event("09:03", "8")];

        assert_eq!(merge(&buy, &sell), merge(&buy, &sell));
    }

    #[test]
    fn uses_byte_order_for_keys() {
        let buy = vec![event("b", "1"), event("B", "1"), event("a", "1")];

        let keys: Vec<String> = merge(&buy, &[]).into_iter().map(|row| row.time).collect();

        assert_eq!(keys, vec!["B", "a", "b"]);
    }

    #[test]
    fn payload_without_data_is_malformed() {
        let result = merge_payload(RawChartPayload::default());
        assert!(matches!(result, Err(FetchError::MalformedPayload(_))));
    }

    #[test]
    fn payload_with_data_is_merged() {
        let payload = RawChartPayload {
            data: Some(RawChartData {
                buy: vec![event("09:00", "1")],
                sell: Vec::new(),
            }),
            message: None,
        };

        let rows = merge_payload(payload).expect("payload with data should merge");
        assert_eq!(rows, vec![row("09:00", Some(1.0), None)]);
    }

    #[test]
    fn decodes_chart_wire_format() {
        let mut payload = br#"{"data":{"buy":[{"time":"09:00","lot":{"raw":"120","formatted":"120"},"frequency":{"raw":"4","formatted":"4"}}],"sell":[]},"message":"ok"}"#.to_vec();
        let decoded: RawChartPayload =
            simd_json::serde::from_slice(&mut payload).expect("chart payload should decode");

        let rows = merge_payload(decoded).expect("decoded payload should merge");
        assert_eq!(rows, vec![row("09:00", Some(120.0), None)]);
    }

    #[test]
    fn null_and_numeric_lots_merge_as_numbers() {
        let mut payload = br#"{"data":{"buy":[{"time":"09:00","lot":{"raw":null,"formatted":null},"frequency":{"raw":"4"}},{"time":"09:01","lot":{"raw":120}}],"sell":[{"time":"09:01","lot":{"raw":7.5}}]}}"#.to_vec();
        let decoded: RawChartPayload =
            simd_json::serde::from_slice(&mut payload).expect("chart payload should decode");

        let rows = merge_payload(decoded).expect("decoded payload should merge");
        assert_eq!(
            rows,
            vec![
                row("09:00", Some(0.0), None),
                row("09:01", Some(120.0), Some(7.5)),
            ]
        );
    }

    #[test]
    fn null_side_merges_as_empty() {
        let mut payload =
            br#"{"data":{"buy":[{"time":"09:00","lot":{"raw":"3"}}],"sell":null}}"#.to_vec();
        let decoded: RawChartPayload =
            simd_json::serde::from_slice(&mut payload).expect("chart payload should decode");

        let rows = merge_payload(decoded).expect("decoded payload should merge");
        assert_eq!(rows, vec![row("09:00", Some(3.0), None)]);
    }
}
