//! Demonstrates routing Google Analytics reporting calls through a remote quota server.
//!
//! A mock quota server issues one grant and records its dismissal. The "API client" here is a
//! closure that answers every request locally, standing in for a generated Google API client.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use serde_json::{Value, json};
// self
use googleapis_quota::{
	config::QuotaConfig,
	dispatch::{DispatchHook, FnDispatch},
	lifecycle::QuotaController,
	request::{ApiRequest, ApiResponse},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let grant_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/v1/managers/ga-core/grants");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(json!({ "id": "demo-grant" }));
		})
		.await;
	let dismiss_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/v1/grants/demo-grant/dismiss");
			then.status(204);
		})
		.await;
	let api = FnDispatch(|request: ApiRequest| async move {
		Ok(ApiResponse::new(200, json!({ "kind": "analytics#gaData", "query": request.params })))
	});
	let controller = QuotaController::new(Arc::new(DispatchHook::new(Arc::new(api))));

	controller.start(QuotaConfig::new([server.base_url()])?)?;

	let Value::Object(params) = json!({
		"ids": "ga:12345",
		"start-date": "7daysAgo",
		"end-date": "today",
		"metrics": "ga:sessions",
	}) else {
		unreachable!()
	};
	let request = ApiRequest::new("https://www.googleapis.com/analytics/v3/data/ga", params);
	let response = controller.hook().call(request).await?;

	println!("API responded with {}: {}", response.status, response.body);

	// Dismissals are sent in the background; give the mock server a moment to see it.
	tokio::time::sleep(std::time::Duration::from_millis(250)).await;
	controller.stop();

	grant_mock.assert_async().await;
	dismiss_mock.assert_async().await;

	Ok(())
}
