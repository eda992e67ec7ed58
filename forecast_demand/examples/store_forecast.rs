use chrono::NaiveDate;
use forecast_demand::data::{AdminRegion, IncomeBracket, Locality, SizeCategory};
use forecast_demand::feeds::{ReferenceFeeds, ReferenceSnapshot};
use forecast_demand::reference::{FestivalCalendar, FestivalDay};
use forecast_demand::synthetic::{generate_history, to_transactions};
use forecast_demand::{
    requires_zero_restock, DemandPattern, Event, EventFeed, EventType, ForecastConfig, ForecastPipeline, GeoPoint,
    ProductCatalog, Store,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("Kirana Demand Forecast Example");
    println!("==============================\n");

    let pune = GeoPoint::new(18.5204, 73.8567);
    let today = NaiveDate::from_ymd_opt(2024, 10, 30).unwrap();

    // Reference data: Diwali and a cricket screening near the store
    let diwali = FestivalDay {
        name: "diwali".to_string(),
        date: NaiveDate::from_ymd_opt(2024, 10, 31).unwrap(),
        states: Vec::new(),
    };
    let screening = Event::new(
        "ind-nz-t3",
        "India vs New Zealand screening",
        EventType::CricketMatch,
        pune.offset_km(0.6, 0.0),
        today + chrono::Duration::days(1),
        today + chrono::Duration::days(1),
        2.0,
    )
    .with_attendance(1_500);

    let config = ForecastConfig::default();
    let snapshot = ReferenceSnapshot {
        festivals: Some(Arc::new(FestivalCalendar::new(vec![diwali], None))),
        events: Some(Arc::new(EventFeed::new(vec![screening])?)),
        ..Default::default()
    };
    let feeds = ReferenceFeeds::from_snapshot(config.feeds.clone(), snapshot);

    let catalog = ProductCatalog::new()
        .with("haldiram-bhujia-200g", "snacks")
        .with("thums-up-750ml", "beverages")
        .with("kaju-katli-250g", "sweets");
    let pipeline = ForecastPipeline::new(config, catalog, feeds)?;
    pipeline.set_national_pattern("snacks", DemandPattern::flat(14.0));
    pipeline.set_national_pattern("beverages", DemandPattern::flat(22.0));
    pipeline.set_national_pattern("sweets", DemandPattern::flat(6.0));

    // Three established neighbours and one store that opened last week
    println!("Loading neighbour histories...");
    for (i, km) in [1.0, 2.0, 3.5].iter().enumerate() {
        let id = format!("pune-old-{}", i);
        pipeline.register_store(small_store(&id, pune.offset_km(*km, 0.0)))?;
        let start = today - chrono::Duration::days(60);
        let mut transactions = Vec::new();
        for (sku, mean) in [("haldiram-bhujia-200g", 12.0), ("thums-up-750ml", 20.0), ("kaju-katli-250g", 5.0)] {
            let series = generate_history(&DemandPattern::flat(mean), start, 60, i as u64 * 7 + mean as u64)?;
            transactions.extend(to_transactions(&series, sku, 40.0));
        }
        let days = pipeline.record_transactions(&id, &transactions)?;
        println!("  {}: {} days of data", id, days);
    }
    pipeline.refresh_population()?;

    let newcomer = small_store("pune-new-01", pune).with_skus(["haldiram-bhujia-200g", "thums-up-750ml", "kaju-katli-250g"]);
    pipeline.register_store(newcomer)?;

    println!("\nNext-day forecasts for pune-new-01:");
    for forecast in pipeline.forecast_store("pune-new-01", today)? {
        println!(
            "  {:<22} {:>6.1} units  [{:>5.1}, {:>5.1}]  conf {:.2}  source {:?}",
            forecast.sku(),
            forecast.predicted_demand(),
            forecast.confidence_lower(),
            forecast.confidence_upper(),
            forecast.confidence_score(),
            forecast.data_source()
        );
        for (name, effect) in forecast.contributing_factors() {
            if name.starts_with("event:") {
                println!("      {} x{:.2}", name, effect);
            }
        }
        let on_hand = 40.0;
        if requires_zero_restock(on_hand, &forecast)? {
            println!("      {} units on hand, no restock needed", on_hand);
        }
    }

    Ok(())
}

fn small_store(id: &str, location: GeoPoint) -> Store {
    Store::new(
        id,
        location,
        AdminRegion::new("Maharashtra", "Pune", "411001"),
        Locality::Urban,
        SizeCategory::Small,
        IncomeBracket::LowerMiddle,
    )
}
