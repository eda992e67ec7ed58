use chrono::{Duration, NaiveDate, TimeZone, Utc};
use forecast_demand::data::{AdminRegion, IncomeBracket, Locality, SizeCategory};
use forecast_demand::feeds::{ReferenceFeeds, ReferenceSnapshot};
use forecast_demand::synthetic::{generate_history, to_transactions};
use forecast_demand::{
    CycleOutcome, DemandPattern, ForecastConfig, ForecastPipeline, GeoPoint, ModelStore, ProductCatalog, Store,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("Weekly Retraining Example");
    println!("=========================\n");

    let model_dir = std::env::temp_dir().join("kirana-models");
    let config = ForecastConfig::default().with_worker_threads(2);
    let feeds = ReferenceFeeds::from_snapshot(config.feeds.clone(), ReferenceSnapshot::default());
    let catalog = ProductCatalog::new()
        .with("tata-salt-1kg", "staples")
        .with("fortune-oil-1l", "staples")
        .with("amul-butter-100g", "dairy");
    let pipeline = ForecastPipeline::new(config, catalog, feeds)?.with_model_store(ModelStore::new(&model_dir)?);
    pipeline.set_national_pattern("staples", DemandPattern::flat(8.0));
    pipeline.set_national_pattern("dairy", DemandPattern::flat(15.0));

    let store = Store::new(
        "nashik-07",
        GeoPoint::new(19.9975, 73.7898),
        AdminRegion::new("Maharashtra", "Nashik", "422001"),
        Locality::SemiUrban,
        SizeCategory::Medium,
        IncomeBracket::Low,
    );
    pipeline.register_store(store)?;

    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let mut weekly = DemandPattern::flat(10.0);
    weekly.day_of_week = [0.9, 0.85, 0.9, 1.0, 1.1, 1.35, 0.9];
    let mut transactions = Vec::new();
    for (seed, (sku, scale)) in [("tata-salt-1kg", 0.8), ("fortune-oil-1l", 0.6), ("amul-butter-100g", 1.4)]
        .into_iter()
        .enumerate()
    {
        let series = generate_history(&weekly.scaled(scale), start, 120, seed as u64)?;
        transactions.extend(to_transactions(&series, sku, 50.0));
    }
    let days = pipeline.record_transactions("nashik-07", &transactions)?;
    println!("Loaded {} transactions covering {} days\n", transactions.len(), days);

    let mut now = Utc.with_ymd_and_hms(2024, 4, 30, 2, 0, 0).unwrap();
    for week in 1..=2 {
        println!("Cycle {} at {}", week, now);
        for (store_id, outcome) in pipeline.run_retraining(now) {
            match outcome {
                CycleOutcome::Promoted { version, metrics } => println!(
                    "  {}: promoted v{} (MAPE {:.2}%, RMSE {:.2}, {} SKU-days)",
                    store_id, version, metrics.mape, metrics.rmse, metrics.evaluated_days
                ),
                CycleOutcome::Retained { warning } => println!("  {}: retained live model ({})", store_id, warning.message),
                CycleOutcome::Failed { error, retry_at } => {
                    println!("  {}: failed ({}), retry at {}", store_id, error, retry_at)
                }
            }
        }
        now += Duration::days(7);
    }

    let as_of = NaiveDate::from_ymd_opt(2024, 4, 29).unwrap();
    println!("\nNext week for amul-butter-100g:");
    for forecast in pipeline.forecast_next_week("nashik-07", "amul-butter-100g", as_of)? {
        println!(
            "  {}  {:>6.1}  [{:>5.1}, {:>5.1}]  {:?}",
            forecast.target_date(),
            forecast.predicted_demand(),
            forecast.confidence_lower(),
            forecast.confidence_upper(),
            forecast.data_source()
        );
    }
    println!("\nModel states saved under {}", model_dir.display());

    Ok(())
}
