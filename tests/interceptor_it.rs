// std
use std::{
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};
// crates.io
use serde_json::{Value, json};
use tokio::sync::Semaphore;
// self
use googleapis_quota::{
	config::QuotaConfig,
	dispatch::{Dispatch, DispatchHook, FnDispatch},
	error::{Error, MalformedRequest, QuotaError},
	gateway::MemoryGateway,
	lifecycle::QuotaController,
	request::{ApiRequest, ApiResponse, ScopeKey},
};

const GA: &str = "https://www.googleapis.com/analytics/v3/data/ga";

fn request(params: Value) -> ApiRequest {
	let Value::Object(params) = params else { panic!("Fixture params must be an object.") };

	ApiRequest::new(GA, params)
}

fn view(id: &str) -> ScopeKey {
	ScopeKey::from([("viewId".into(), id.into())])
}

/// Dispatch that waits for a permit from `gate` before echoing the request parameters.
fn gated_dispatch(gate: Arc<Semaphore>, calls: Arc<AtomicUsize>) -> Arc<dyn Dispatch> {
	Arc::new(FnDispatch(move |request: ApiRequest| {
		let gate = gate.clone();

		calls.fetch_add(1, Ordering::SeqCst);

		async move {
			let _permit = gate.acquire_owned().await.expect("Gate should stay open.");

			Ok(ApiResponse::new(200, Value::Object(request.params)))
		}
	}))
}

fn open_dispatch(calls: Arc<AtomicUsize>) -> Arc<dyn Dispatch> {
	gated_dispatch(Arc::new(Semaphore::new(Semaphore::MAX_PERMITS)), calls)
}

fn controller_for(dispatch: Arc<dyn Dispatch>) -> QuotaController {
	QuotaController::new(Arc::new(DispatchHook::new(dispatch)))
}

#[tokio::test]
async fn calls_flow_to_the_original_dispatch_only_while_started() {
	let calls = Arc::new(AtomicUsize::new(0));
	let gateway = MemoryGateway::default().with_limit("ga-core", "requests", 0);
	let controller = controller_for(open_dispatch(calls.clone()));

	controller
		.hook()
		.call(request(json!({ "ids": "ga:1" })))
		.await
		.expect("Unhooked call should pass.");
	controller
		.start_with_gateway(Arc::new(gateway), QuotaConfig::default())
		.expect("Controller should start.");

	let err = controller
		.hook()
		.call(request(json!({ "ids": "ga:1" })))
		.await
		.expect_err("Zero budget should deny the call.");

	assert!(matches!(err, Error::QuotaUnavailable(QuotaError::Exhausted { .. })));
	assert!(err.is_quota_layer());

	controller.stop();
	controller
		.hook()
		.call(request(json!({ "ids": "ga:1" })))
		.await
		.expect("Stopped hook should pass.");

	assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_calls_share_the_scope_budget() {
	let gate = Arc::new(Semaphore::new(0));
	let calls = Arc::new(AtomicUsize::new(0));
	let gateway = MemoryGateway::default().with_limit("ga-core", "requests", 2);
	let hook = Arc::new(DispatchHook::new(gated_dispatch(gate.clone(), calls.clone())));
	let controller = QuotaController::new(hook.clone());
	let interceptor = controller
		.start_with_gateway(Arc::new(gateway.clone()), QuotaConfig::default())
		.expect("Controller should start.");
	let tasks = (0..5)
		.map(|_| {
			let hook = hook.clone();

			tokio::spawn(async move { hook.call(request(json!({ "ids": "ga:777" }))).await })
		})
		.collect::<Vec<_>>();

	tokio::time::timeout(Duration::from_secs(5), async {
		while interceptor.metrics().denied() < 3 {
			tokio::task::yield_now().await;
		}
	})
	.await
	.expect("Three calls should be denied while two hold the budget.");

	assert_eq!(gateway.in_flight("ga-core", &view("777"), "requests"), 2);

	gate.add_permits(5);

	let mut granted = 0;

	for task in tasks {
		match task.await.expect("Call task should not panic.") {
			Ok(_) => granted += 1,
			Err(e) => assert!(matches!(e, Error::QuotaUnavailable(QuotaError::Exhausted { .. }))),
		}
	}

	assert_eq!(granted, 2);
	assert_eq!(calls.load(Ordering::SeqCst), 2);
	assert_eq!(interceptor.metrics().dismissed(), 2);
	assert_eq!(gateway.in_flight("ga-core", &view("777"), "requests"), 0);

	controller.stop();
}

#[tokio::test]
async fn cancelled_calls_release_their_grant() {
	let gate = Arc::new(Semaphore::new(0));
	let gateway = MemoryGateway::default().with_limit("ga-core", "requests", 1);
	let controller = controller_for(gated_dispatch(gate.clone(), Arc::new(AtomicUsize::new(0))));

	controller
		.start_with_gateway(Arc::new(gateway.clone()), QuotaConfig::default())
		.expect("Controller should start.");

	let outcome = tokio::time::timeout(
		Duration::from_millis(50),
		controller.hook().call(request(json!({ "ids": "ga:42" }))),
	)
	.await;

	assert!(outcome.is_err());
	assert_eq!(gateway.in_flight("ga-core", &view("42"), "requests"), 0);

	gate.add_permits(1);
	controller
		.hook()
		.call(request(json!({ "ids": "ga:42" })))
		.await
		.expect("Released budget should admit the next call.");
	controller.stop();
}

#[tokio::test]
async fn quota_parameter_controls_interception() {
	let calls = Arc::new(AtomicUsize::new(0));
	let gateway = MemoryGateway::default().strict().with_limit("ga-reports", "rows", 10);
	let controller = controller_for(open_dispatch(calls.clone()));
	let interceptor = controller
		.start_with_gateway(Arc::new(gateway.clone()), QuotaConfig::default())
		.expect("Controller should start.");

	// Strict gateways do not know `ga-core`, so only calls without quota reach the dispatch.
	controller
		.hook()
		.call(request(json!({ "ids": "ga:5", "quota": false })))
		.await
		.expect("Disabled quota should bypass the gateway.");
	controller
		.hook()
		.call(request(json!({ "ids": "ga:5", "quota": { "managerName": "" } })))
		.await
		.expect("An empty manager name should bypass the gateway.");

	let err = controller
		.hook()
		.call(request(json!({ "ids": "ga:5" })))
		.await
		.expect_err("Unknown manager should be refused.");

	let Error::QuotaUnavailable(QuotaError::UnknownManager { manager_id }) = err else {
		panic!("Unknown manager should surface as a quota error.");
	};

	assert_eq!(manager_id, "ga-core");

	let response = controller
		.hook()
		.call(request(json!({
			"ids": "ga:5",
			"quota": {
				"managerName": "reports",
				"scope": { "team": "growth" },
				"resources": { "rows": 4 }
			}
		})))
		.await
		.expect("Override should route to the configured manager.");

	assert_eq!(response.status, 200);

	let team = ScopeKey::from([("team".into(), "growth".into())]);

	assert_eq!(gateway.in_flight("ga-reports", &team, "rows"), 0);

	let err = controller
		.hook()
		.call(request(json!({ "ids": "ga:5", "quota": { "manager": "reports" } })))
		.await
		.expect_err("Unknown override fields should be rejected.");

	assert!(matches!(err, Error::MalformedRequest(MalformedRequest::InvalidQuotaParam { .. })));
	assert_eq!(calls.load(Ordering::SeqCst), 3);
	assert_eq!(interceptor.metrics().bypassed(), 2);
	assert_eq!(interceptor.metrics().malformed(), 1);
	assert_eq!(interceptor.metrics().denied(), 1);

	controller.stop();
}

#[tokio::test]
async fn malformed_analytics_requests_never_dispatch() {
	let calls = Arc::new(AtomicUsize::new(0));
	let controller = controller_for(open_dispatch(calls.clone()));

	controller
		.start_with_gateway(Arc::new(MemoryGateway::default()), QuotaConfig::default())
		.expect("Controller should start.");

	let missing = controller
		.hook()
		.call(request(json!({ "metrics": "ga:sessions" })))
		.await
		.expect_err("Missing ids should be rejected.");
	let mismatch = controller
		.hook()
		.call(request(json!({ "ids": "12345" })))
		.await
		.expect_err("Unprefixed ids should be rejected.");

	assert!(matches!(missing, Error::MalformedRequest(MalformedRequest::MissingParam { .. })));
	assert!(matches!(mismatch, Error::MalformedRequest(MalformedRequest::PatternMismatch { .. })));
	assert_eq!(calls.load(Ordering::SeqCst), 0);

	controller.stop();
}

#[tokio::test]
async fn callback_form_reports_the_same_result() {
	let controller = controller_for(open_dispatch(Arc::new(AtomicUsize::new(0))));

	controller
		.start_with_gateway(Arc::new(MemoryGateway::default()), QuotaConfig::default())
		.expect("Controller should start.");

	let mut seen = None;

	controller
		.hook()
		.call_with_callback(request(json!({ "ids": "ga:9" })), |result| seen = Some(result))
		.await;

	let response = seen.expect("Callback should run.").expect("Call should succeed.");

	assert_eq!(response.body["ids"], "ga:9");

	controller.stop();
}
