//! Transformers: stages that reshape a result stream.

use chrono::Utc;
use futures::StreamExt;
use mediax_core::{Context, Operator, Retrievable, RetrievableId, RetrievableStream, Transformer};
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, warn};

/// Union of several result streams.
///
/// Copies of the same retrievable are merged; since distance is the minimum
/// over attached distances, the merged item keeps its best distance. Output is
/// ordered by ascending distance, then descending score, then first arrival.
pub struct MergeTransformer {
    name: String,
    inputs: Vec<Box<dyn Operator>>,
}

impl MergeTransformer {
    pub fn new(name: impl Into<String>, inputs: Vec<Box<dyn Operator>>) -> Self {
        Self {
            name: name.into(),
            inputs,
        }
    }
}

fn rank(a: &Retrievable, b: &Retrievable) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a.distance(), b.distance()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => match (a.score(), b.score()) {
            (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
    }
}

impl Operator for MergeTransformer {
    fn name(&self) -> &str {
        &self.name
    }

    fn into_stream(self: Box<Self>) -> RetrievableStream {
        let MergeTransformer { name, inputs } = *self;
        Box::pin(async_stream::stream! {
            let mut merged = futures::stream::select_all(inputs.into_iter().map(|i| i.into_stream()));
            let mut positions: HashMap<RetrievableId, usize> = HashMap::new();
            let mut results: Vec<Retrievable> = Vec::new();
            while let Some(retrievable) = merged.next().await {
                match positions.get(&retrievable.id()) {
                    Some(&i) => results[i].merge(retrievable),
                    None => {
                        positions.insert(retrievable.id(), results.len());
                        results.push(retrievable);
                    }
                }
            }
            results.sort_by(rank);
            debug!("{} merged {} distinct results", name, results.len());
            for retrievable in results {
                yield retrievable;
            }
        })
    }
}

impl Transformer for MergeTransformer {}

/// Passes through at most `limit` retrievables, then closes its input.
pub struct LimitTransformer {
    name: String,
    input: Box<dyn Operator>,
    limit: usize,
}

impl LimitTransformer {
    pub fn new(name: impl Into<String>, input: Box<dyn Operator>, limit: usize) -> Self {
        Self {
            name: name.into(),
            input,
            limit,
        }
    }

    /// Reads `limit` from the context, falling back to `default`.
    pub fn from_context(name: impl Into<String>, input: Box<dyn Operator>, context: &Context, default: usize) -> Self {
        let name = name.into();
        let limit = context.get_parsed(&name, "limit").unwrap_or(default);
        Self::new(name, input, limit)
    }
}

impl Operator for LimitTransformer {
    fn name(&self) -> &str {
        &self.name
    }

    fn into_stream(self: Box<Self>) -> RetrievableStream {
        Box::pin(self.input.into_stream().take(self.limit))
    }
}

impl Transformer for LimitTransformer {}

pub const DEFAULT_BENCHMARK_LOG: &str = "benchmark.log";

#[derive(Debug, Serialize)]
struct BenchmarkRecord<'a> {
    name: &'a str,
    timestamp: String,
    first_result_ms: Option<f64>,
    total_ms: f64,
    count: usize,
}

/// Measures the wall-clock time of a stream and appends one JSON line per
/// run to a log file.
pub struct TimeBenchmark {
    name: String,
    input: Box<dyn Operator>,
    logfile: PathBuf,
    pretty: String,
}

impl TimeBenchmark {
    pub fn new(name: impl Into<String>, input: Box<dyn Operator>, logfile: impl Into<PathBuf>, pretty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input,
            logfile: logfile.into(),
            pretty: pretty.into(),
        }
    }

    /// Reads `logfile` and `pretty` from the context. The display name
    /// defaults to the operator name.
    pub fn from_context(name: impl Into<String>, input: Box<dyn Operator>, context: &Context) -> Self {
        let name = name.into();
        let logfile = context.get(&name, "logfile").unwrap_or(DEFAULT_BENCHMARK_LOG).to_string();
        let pretty = context.get(&name, "pretty").unwrap_or(&name).to_string();
        Self::new(name, input, logfile, pretty)
    }
}

fn append_record(logfile: &PathBuf, record: &BenchmarkRecord<'_>) -> std::io::Result<()> {
    let line = serde_json::to_string(record)?;
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(logfile)?;
    writeln!(file, "{}", line)
}

impl Operator for TimeBenchmark {
    fn name(&self) -> &str {
        &self.name
    }

    fn into_stream(self: Box<Self>) -> RetrievableStream {
        let TimeBenchmark {
            name,
            input,
            logfile,
            pretty,
        } = *self;
        Box::pin(async_stream::stream! {
            let start = Instant::now();
            let mut first = None;
            let mut count = 0;
            let mut input = input.into_stream();
            while let Some(retrievable) = input.next().await {
                if first.is_none() {
                    first = Some(start.elapsed().as_secs_f64() * 1000.0);
                }
                count += 1;
                yield retrievable;
            }
            let record = BenchmarkRecord {
                name: &pretty,
                timestamp: Utc::now().to_rfc3339(),
                first_result_ms: first,
                total_ms: start.elapsed().as_secs_f64() * 1000.0,
                count,
            };
            debug!("{}: {} results in {:.2} ms", name, count, record.total_ms);
            if let Err(e) = append_record(&logfile, &record) {
                warn!("{} cannot write benchmark log {}: {}", name, logfile.display(), e);
            }
        })
    }
}

impl Transformer for TimeBenchmark {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enumerate::ListEnumerator;
    use mediax_core::RetrievableAttribute;
    use tempfile::TempDir;

    fn with_distance(r: &Retrievable, d: f32) -> Retrievable {
        let mut copy = r.clone();
        copy.add_attribute(RetrievableAttribute::Distance(d));
        copy
    }

    #[tokio::test]
    async fn test_merge_deduplicates_and_keeps_best_distance() {
        let a = Retrievable::new(None);
        let b = Retrievable::new(None);
        let first = ListEnumerator::new("one", vec![with_distance(&a, 0.9), with_distance(&b, 0.4)]);
        let second = ListEnumerator::new("two", vec![with_distance(&a, 0.1)]);
        let merge = MergeTransformer::new("merge", vec![Box::new(first), Box::new(second)]);
        let out: Vec<_> = Box::new(merge).into_stream().collect().await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id(), a.id());
        assert_eq!(out[0].distance(), Some(0.1));
        assert_eq!(out[1].id(), b.id());
    }

    #[tokio::test]
    async fn test_merge_orders_scores_descending() {
        let mut low = Retrievable::new(None);
        low.add_attribute(RetrievableAttribute::Score(0.2));
        let mut high = Retrievable::new(None);
        high.add_attribute(RetrievableAttribute::Score(0.8));
        let high_id = high.id();
        let input = ListEnumerator::new("scores", vec![low, high]);
        let merge = MergeTransformer::new("merge", vec![Box::new(input)]);
        let out: Vec<_> = Box::new(merge).into_stream().collect().await;
        assert_eq!(out[0].id(), high_id);
    }

    #[tokio::test]
    async fn test_limit_from_context() {
        let items: Vec<_> = (0..5).map(|_| Retrievable::new(None)).collect();
        let context = Context::new("test").with("limit", "limit", "3");
        let limit = LimitTransformer::from_context("limit", Box::new(ListEnumerator::new("list", items)), &context, 10);
        assert_eq!(Box::new(limit).into_stream().count().await, 3);
    }

    #[tokio::test]
    async fn test_time_benchmark_appends_json_lines() {
        let dir = TempDir::new().unwrap();
        let logfile = dir.path().join("bench.log");
        let context = Context::new("test").with("bench", "logfile", logfile.to_string_lossy());
        for _ in 0..2 {
            let items = vec![Retrievable::new(None), Retrievable::new(None)];
            let bench = TimeBenchmark::from_context("bench", Box::new(ListEnumerator::new("list", items)), &context);
            assert_eq!(Box::new(bench).into_stream().count().await, 2);
        }
        let log = std::fs::read_to_string(&logfile).unwrap();
        let lines: Vec<serde_json::Value> = log.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["name"], "bench");
        assert_eq!(lines[0]["count"], 2);
        assert!(lines[1]["total_ms"].as_f64().unwrap() >= 0.0);
    }
}
