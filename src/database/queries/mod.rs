pub mod fetch_samples;
