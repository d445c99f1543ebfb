#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod adapters;
mod api;
mod collector;
mod core_logic;
mod database;
mod error;

use std::env;
use std::sync::Arc;

use dotenv::dotenv;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use warp::http::StatusCode;
use warp::Filter;

use adapters::narrative::{GeminiClient, Narrator};
use api::models::AnalysisRequest;
use collector::DataCollector;
use core_logic::orchestrator;
use database::DbCollector;

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let collector: Arc<dyn DataCollector> = Arc::new(DbCollector);
    let narrator: Arc<dyn Narrator> = Arc::new(GeminiClient::from_env());

    // One route; the orchestrator dispatches on the analysis type tag.
    // Business errors map to 400 envelopes, unexpected failures to a
    // generic 500.
    let analyze_route = warp::path("analyze")
        .and(warp::post())
        .and(warp::body::json())
        .and_then({
            let collector = Arc::clone(&collector);
            let narrator = Arc::clone(&narrator);
            move |request: AnalysisRequest| {
                let collector = Arc::clone(&collector);
                let narrator = Arc::clone(&narrator);
                async move {
                    let reply = match orchestrator::process(
                        request,
                        collector.as_ref(),
                        narrator.as_ref(),
                    )
                    .await
                    {
                        Ok(response) => {
                            let status = if response.is_error() {
                                StatusCode::BAD_REQUEST
                            } else {
                                StatusCode::OK
                            };
                            warp::reply::with_status(warp::reply::json(&response), status)
                        }
                        Err(e) => {
                            error!(error = %e, "analysis request failed");
                            warp::reply::with_status(
                                warp::reply::json(
                                    &serde_json::json!({ "error": "internal processing failure" }),
                                ),
                                StatusCode::INTERNAL_SERVER_ERROR,
                            )
                        }
                    };
                    Ok::<_, warp::Rejection>(reply)
                }
            }
        });

    let port: u16 = env::var("PORT")
        .unwrap_or_else(|_| "8001".to_string())
        .parse()
        .expect("PORT must be a number");

    info!(port, "starting analysis server");
    warp::serve(analyze_route).run(([127, 0, 0, 1], port)).await;
}
