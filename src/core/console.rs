use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use prettytable::{format, row, Cell, Row, Table};

use crate::core::aggregator::MetricSummary;
use crate::core::reporter::{log_event, ReportEvent, Reporter};
use crate::models::result::TestSummary;

/// 终端输出：进度条加日志
pub struct ConsoleReporter {
    show_progress: bool,
    bar: Mutex<Option<ProgressBar>>,
}

impl ConsoleReporter {
    pub fn new(show_progress: bool) -> Self {
        ConsoleReporter {
            show_progress,
            bar: Mutex::new(None),
        }
    }

    fn update_progress(&self, elapsed: Duration, total: Duration, target: usize, active: usize) {
        let mut bar = self.bar.lock();
        let pb = bar.get_or_insert_with(|| {
            let pb = ProgressBar::new(total.as_secs().max(1));
            if let Ok(style) = ProgressStyle::with_template("{elapsed_precise} [{bar:40}] {pos}/{len}s {msg}") {
                pb.set_style(style.progress_chars("=> "));
            }
            pb
        });
        pb.set_position(elapsed.as_secs());
        pb.set_message(format!("VU {}/{}", active, target));
    }
}

impl Reporter for ConsoleReporter {
    fn report(&self, event: ReportEvent) {
        match &event {
            ReportEvent::Tick {
                elapsed,
                total,
                target,
                active,
            } if self.show_progress => self.update_progress(*elapsed, *total, *target, *active),
            ReportEvent::Draining { .. } => {
                if let Some(pb) = self.bar.lock().take() {
                    pb.finish_and_clear();
                }
            }
            _ => {}
        }
        // 避免日志和进度条互相覆盖
        match self.bar.lock().as_ref() {
            Some(pb) => pb.suspend(|| log_event(&event)),
            None => log_event(&event),
        }
    }
}

pub fn show_summary_table(summary: &TestSummary) {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);

    table.add_row(row!["指标", "值"]);
    table.add_row(row!["目标地址", summary.target]);
    table.add_row(row!["持续时间", format!("{:.2}s", summary.total_duration)]);
    table.add_row(row!["最大 VU", summary.peak_vus]);
    table.add_row(row!["RPS", format!("{:.3}", summary.rps)]);
    table.add_row(row!["总请求数", summary.total_requests]);
    table.add_row(row!["错误率", format!("{:.2}%", summary.error_rate * 100.0)]);
    if let Some(p95) = summary.latency_p95() {
        table.add_row(row!["95%响应时间", format!("{:.0} ms", p95)]);
    }
    if summary.drain.abandoned > 0 {
        table.add_row(row!["被中止的 VU", summary.drain.abandoned]);
    }
    println!("压测结果:");
    table.printstd();

    let mut metrics = Table::new();
    metrics.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);
    metrics.add_row(row!["指标名", "类型", "统计"]);
    for (name, metric) in summary.metrics.iter() {
        let detail = match metric {
            MetricSummary::Counter { sum, .. } => format!("{}", sum),
            MetricSummary::Rate { hits, total } => format!(
                "{:.2}% ({}/{})",
                metric.rate().unwrap_or(0.0) * 100.0,
                hits,
                total
            ),
            MetricSummary::Trend(t) => {
                let mut parts = vec![
                    format!("avg={:.2}ms", t.avg),
                    format!("min={:.2}ms", t.min),
                    format!("max={:.2}ms", t.max),
                ];
                parts.extend(t.percentiles.iter().map(|pv| format!("p({})={:.0}ms", pv.p, pv.value)));
                parts.join(" ")
            }
        };
        metrics.add_row(Row::new(vec![
            Cell::new(name),
            Cell::new(&format!("{:?}", metric.kind()).to_lowercase()),
            Cell::new(&detail),
        ]));
    }
    println!("指标:");
    metrics.printstd();

    if !summary.checks.is_empty() {
        let mut checks = Table::new();
        checks.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);
        checks.add_row(row!["断言", "通过", "失败", "通过率"]);
        for (name, tally) in &summary.checks {
            let mark = if tally.fails == 0 { "✓" } else { "✗" };
            checks.add_row(row![
                format!("{} {}", mark, name),
                tally.passes,
                tally.fails,
                format!("{:.2}%", tally.pass_rate() * 100.0)
            ]);
        }
        println!("断言:");
        checks.printstd();
    }

    if !summary.http_errors.is_empty() {
        let mut errors_table = Table::new();
        errors_table.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);
        errors_table.add_row(row!["错误代码", "错误信息", "次数"]);
        for e in &summary.http_errors {
            let code = e.status.map(|s| format!("{:03}", s)).unwrap_or_else(|| "-".to_string());
            errors_table.add_row(Row::new(vec![
                Cell::new(&code),
                Cell::new(&e.message).style_spec("R"),
                Cell::new(&e.count.to_string()),
            ]));
        }
        println!("HTTP 错误:");
        errors_table.printstd();
    }

    let mut thresholds = Table::new();
    thresholds.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);
    thresholds.add_row(row!["阈值", "实际值", "结果"]);
    for r in &summary.verdict.results {
        let observed = r
            .observed
            .map(|v| format!("{:.4}", v))
            .or_else(|| r.reason.clone())
            .unwrap_or_default();
        let result = if r.passed { "通过" } else { "未通过" };
        thresholds.add_row(row![format!("{}: {}", r.metric, r.source), observed, result]);
    }
    println!("阈值:");
    thresholds.printstd();
    println!("{}", if summary.passed() { "结论: 通过" } else { "结论: 未通过" });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::aggregator::Aggregator;
    use crate::core::vu_pool::DrainReport;
    use crate::models::check_stats::CheckStats;
    use crate::models::http_error_stats::HttpErrorStats;
    use crate::models::metric_sample::{ERROR_RATE, HTTP_REQS, HTTP_REQ_DURATION};
    use crate::models::threshold::Verdict;

    #[test]
    fn test_progress_lifecycle() {
        let reporter = ConsoleReporter::new(true);
        reporter.report(ReportEvent::Tick {
            elapsed: Duration::from_secs(1),
            total: Duration::from_secs(10),
            target: 3,
            active: 2,
        });
        assert!(reporter.bar.lock().is_some());
        reporter.report(ReportEvent::Draining { in_flight: 2 });
        assert!(reporter.bar.lock().is_none());
    }

    #[test]
    fn test_summary_table_renders() {
        let agg = Aggregator::new();
        agg.add_counter(HTTP_REQS, 2.0);
        agg.add_rate(ERROR_RATE, true);
        agg.add_rate(ERROR_RATE, false);
        agg.add_trend(HTTP_REQ_DURATION, 120.0);
        let checks = CheckStats::new();
        checks.record("status 200", false);
        let errors = HttpErrorStats::new();
        errors.increment(Some(500), "HTTP 错误: 状态码 500".to_string());

        let metrics = agg.snapshot();
        let (total_requests, rps, error_rate) = TestSummary::headline(&metrics, 2.0);
        let summary = TestSummary {
            target: "http://localhost:8080/".to_string(),
            total_duration: 2.0,
            peak_vus: 1,
            spawned_vus: 1,
            total_requests,
            rps,
            error_rate,
            metrics,
            verdict: Verdict {
                results: vec![],
                passed: true,
            },
            checks: checks.snapshot(),
            http_errors: errors.entries(),
            auth_failures: 0,
            drain: DrainReport::default(),
            interrupted: false,
            timestamp: 0,
        };
        assert_eq!(summary.latency_p95(), Some(120.0));
        show_summary_table(&summary);
    }
}
