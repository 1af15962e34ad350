use clap::ValueEnum;
use fair_price::comparables::ComparableSet;
use fair_price::domain::{MarketObservation, Property, ValuationEstimate};
use fair_price::error::AppError;
use fair_price::market::MarketSummary;
use fair_price::service::{BatchOutcome, BatchReport, ClassificationResult};
use serde::Serialize;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum OutputFormat {
    #[default]
    Text,
    Json,
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn dollars(amount: u64) -> String {
    let digits = amount.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    format!("${grouped}")
}

pub(crate) fn render_estimate(property: &Property, estimate: &ValuationEstimate) {
    println!("Fair price for {}", property.address);
    println!("- property id: {}", property.id);
    println!(
        "- point estimate: {} (range {} to {})",
        dollars(estimate.point_estimate),
        dollars(estimate.low),
        dollars(estimate.high)
    );
    println!(
        "- confidence: {:.2} from {} comparables within {} months",
        estimate.confidence_value(),
        estimate.comparables.len(),
        estimate.window_months
    );
    for component in &estimate.confidence.components {
        println!(
            "  - {}: {:.2} (weight {:.1}) {}",
            component.kind, component.value, component.weight, component.note
        );
    }
    println!("- as of {}", estimate.as_of);
}

pub(crate) fn render_classification(property: &Property, result: &ClassificationResult) {
    render_estimate(property, &result.estimate);
    let classification = &result.classification;
    println!(
        "Listing at {} is {} ({:+.1}% vs fair price, threshold ±{:.1}%)",
        dollars(classification.list_price),
        classification.label,
        classification.deviation_percent,
        classification.threshold_percent
    );
}

pub(crate) fn render_comparables(property: &Property, set: &ComparableSet) {
    println!("Comparables for {}", property.address);
    println!(
        "- window {} months | {} candidates | {} outliers removed{}",
        set.window_months,
        set.candidates_found,
        set.outliers_removed,
        if set.ring_used { " | fallback radius used" } else { "" }
    );
    if set.is_empty() {
        println!("  (none)");
        return;
    }
    for comparable in &set.comparables {
        println!(
            "  - {} | {} on {} | {}bd/{}ba {} sqft | {:.1} months old | weight {:.3}",
            comparable.address,
            dollars(comparable.price),
            comparable.sale_date,
            comparable.structure.bedrooms,
            comparable.structure.bathrooms,
            comparable.structure.living_area_sqft,
            comparable.age_months,
            comparable.weight
        );
    }
}

pub(crate) fn render_batch(report: &BatchReport) {
    println!(
        "Batch valuation: {} valued | {} unavailable | {} failed | {} skipped",
        report.valued, report.unavailable, report.failed, report.skipped
    );
    for result in &report.results {
        match &result.outcome {
            BatchOutcome::Valued {
                estimate,
                classification,
                note,
            } => {
                let label = classification
                    .as_ref()
                    .map(|c| format!("{} ({:+.1}%)", c.label, c.deviation_percent))
                    .unwrap_or_else(|| "unclassified".to_string());
                println!(
                    "  - {}: {} [{:.2}] {}",
                    result.property_id,
                    dollars(estimate.point_estimate),
                    estimate.confidence_value(),
                    label
                );
                if let Some(note) = note {
                    println!("    note: {note}");
                }
            }
            BatchOutcome::Unavailable { reason } => {
                println!("  - {}: not available ({reason})", result.property_id);
            }
            BatchOutcome::Failed { error } => {
                println!("  - {}: failed ({error})", result.property_id);
            }
            BatchOutcome::Skipped => println!("  - {}: skipped", result.property_id),
        }
    }
}

pub(crate) fn price_range(summary: &MarketSummary) -> String {
    match (summary.min_price, summary.max_price) {
        (Some(min), Some(max)) => format!("{} - {}", dollars(min), dollars(max)),
        _ => "N/A".to_string(),
    }
}

pub(crate) fn render_summary(summary: &MarketSummary) {
    let scope = summary.zip.as_deref().unwrap_or("all zips");
    println!("Market summary for {scope} as of {}", summary.as_of);
    println!("  Sales: {}", summary.total_sales);
    if let (Some(average), Some(median)) = (summary.average_price, summary.median_price) {
        println!("  Average price: {}", dollars(average.round() as u64));
        println!("  Median price: {}", dollars(median.round() as u64));
    }
    println!("  Price range: {}", price_range(summary));
    println!("  Active listings: {}", summary.active_listings);
}

pub(crate) fn render_trends(observations: &[MarketObservation]) {
    if observations.is_empty() {
        println!("No zip has enough sales for market statistics.");
        return;
    }
    let mut current = None;
    for observation in observations {
        if current != Some(observation.geography.as_str()) {
            println!(
                "Zip {} ({} as of {})",
                observation.geography, observation.source, observation.date
            );
            current = Some(observation.geography.as_str());
        }
        println!("  - {}: {:.2}", observation.metric.label(), observation.value);
    }
}
