//! Entry point for device actions.
//!
//! The [`Dispatcher`] resolves a driver through the [`Registry`], runs one
//! action and always answers with a [`DispatchResponse`], whatever happened.

use serde::Serialize;
use tracing::debug;
use tracing::warn;

use crate::device::ActionResult;
use crate::device::Data;
use crate::device::DeviceClass;
use crate::device::ErrorKind;
use crate::device::Registry;
use crate::device::RequestContext;

/// One action call as described by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRequest {
    pub class: DeviceClass,
    pub brand: String,
    pub id: String,
    pub action: String,
    pub payload: Option<Vec<u8>>,
    pub credential: Option<String>,
    pub bridge: Option<String>,
}

impl DispatchRequest {
    pub fn new(
        class: DeviceClass,
        brand: impl Into<String>,
        id: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            class,
            brand: brand.into(),
            id: id.into(),
            action: action.into(),
            payload: None,
            credential: None,
            bridge: None,
        }
    }

    fn context(&self) -> RequestContext {
        RequestContext {
            payload: self.payload.clone(),
            credential: self.credential.clone(),
            bridge: self.bridge.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

/// Boundary-shaped answer to a [`DispatchRequest`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchResponse {
    pub brand: String,
    pub id: String,
    pub action: String,
    pub result: Option<Data>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub status: Status,
}

impl DispatchResponse {
    fn new(request: DispatchRequest, result: ActionResult) -> Self {
        let (result, error, status) = match result {
            ActionResult::Success(data) => (data, None, Status::Success),
            ActionResult::Failure { kind, message } => {
                (None, Some(ErrorBody { kind, message }), Status::Error)
            }
        };
        Self {
            brand: request.brand,
            id: request.id,
            action: request.action,
            result,
            error,
            status,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

pub struct Dispatcher {
    registry: Registry,
}

impl Dispatcher {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    #[tracing::instrument(
        skip(self, request),
        fields(class = %request.class, brand = %request.brand, id = %request.id, action = %request.action)
    )]
    pub async fn dispatch(&self, request: DispatchRequest) -> DispatchResponse {
        let ctx = request.context();
        let outcome = match self
            .registry
            .resolve(request.class, &request.brand, &request.id, &ctx)
        {
            Ok(driver) => driver.execute_action(&request.action, &ctx).await,
            Err(e) => Err(e),
        };

        let result = ActionResult::from(outcome);
        match &result {
            ActionResult::Success(_) => debug!("Action {} succeeded", request.action),
            ActionResult::Failure { kind, message } => {
                warn!("Action {} failed ({}): {}", request.action, kind, message)
            }
        }
        DispatchResponse::new(request, result)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::device::Services;
    use crate::net::command::MockRunner;
    use crate::net::hue::MockHueClient;
    use crate::net::probe::MockProber;

    fn dispatcher(runner: Arc<MockRunner>, prober: MockProber, hue: MockHueClient) -> Dispatcher {
        Dispatcher::new(Registry::new(Services::mock(
            runner,
            Arc::new(prober),
            Arc::new(hue),
        )))
    }

    fn outlet_off() -> DispatchRequest {
        DispatchRequest::new(DeviceClass::Outlet, "kasa", "10.0.0.5", "off")
    }

    #[tokio::test(start_paused = true)]
    async fn test_off_succeeds_first_attempt() {
        let runner = Arc::new(MockRunner::new().then_ok("Turning off Desk lamp"));
        let dispatcher = dispatcher(runner.clone(), MockProber::new(), MockHueClient::new(200, "{}"));

        let response = dispatcher.dispatch(outlet_off()).await;

        assert_eq!(response.status, Status::Success);
        assert_eq!(response.result, None);
        assert_eq!(runner.call_count(), 1);
        insta::assert_snapshot!(serde_json::to_string_pretty(&response).unwrap(), @r#"
        {
          "brand": "kasa",
          "id": "10.0.0.5",
          "action": "off",
          "result": null,
          "status": "success"
        }
        "#);
    }

    #[tokio::test(start_paused = true)]
    async fn test_off_always_failing() {
        let runner = Arc::new(
            MockRunner::new()
                .then_fail("attempt 1 failed")
                .then_fail("attempt 2 failed")
                .then_fail("attempt 3 failed"),
        );
        let dispatcher = dispatcher(runner.clone(), MockProber::new(), MockHueClient::new(200, "{}"));

        let response = dispatcher.dispatch(outlet_off()).await;

        assert_eq!(response.error_kind(), Some(ErrorKind::DeviceActionFailed));
        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1].1 - calls[0].1, Duration::from_secs(1));
        assert_eq!(calls[2].1 - calls[1].1, Duration::from_secs(2));
        insta::assert_snapshot!(serde_json::to_string_pretty(&response).unwrap(), @r#"
        {
          "brand": "kasa",
          "id": "10.0.0.5",
          "action": "off",
          "result": null,
          "error": {
            "kind": "device_action_failed",
            "message": "failed to perform action: off: attempt 3 failed"
          },
          "status": "error"
        }
        "#);
    }

    #[tokio::test]
    async fn test_unknown_brand() {
        let runner = Arc::new(MockRunner::new());
        let dispatcher = dispatcher(runner.clone(), MockProber::new(), MockHueClient::new(200, "{}"));

        let response = dispatcher
            .dispatch(DispatchRequest::new(
                DeviceClass::Outlet,
                "unknownbrand",
                "1.2.3.4",
                "on",
            ))
            .await;

        assert_eq!(response.error_kind(), Some(ErrorKind::UnsupportedBrand));
        assert_eq!(response.brand, "unknownbrand");
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_action_is_distinct_from_brand() {
        let dispatcher = dispatcher(
            Arc::new(MockRunner::new()),
            MockProber::new(),
            MockHueClient::new(200, "{}"),
        );

        let response = dispatcher
            .dispatch(DispatchRequest::new(DeviceClass::Outlet, "kasa", "10.0.0.5", "dance"))
            .await;

        assert_eq!(response.error_kind(), Some(ErrorKind::UnsupportedAction));
    }

    #[tokio::test]
    async fn test_state_result_data() {
        let runner = Arc::new(MockRunner::new().then_ok("Device state: True\n"));
        let dispatcher = dispatcher(runner, MockProber::new(), MockHueClient::new(200, "{}"));

        let response = dispatcher
            .dispatch(DispatchRequest::new(DeviceClass::Outlet, "kasa", "10.0.0.5", "state"))
            .await;

        insta::assert_snapshot!(serde_json::to_string_pretty(&response).unwrap(), @r#"
        {
          "brand": "kasa",
          "id": "10.0.0.5",
          "action": "state",
          "result": {
            "state": "True"
          },
          "status": "success"
        }
        "#);
    }

    #[tokio::test]
    async fn test_malformed_sysinfo_is_empty_success() {
        let runner = Arc::new(MockRunner::new().then_ok("no info here"));
        let dispatcher = dispatcher(runner, MockProber::new(), MockHueClient::new(200, "{}"));

        let response = dispatcher
            .dispatch(DispatchRequest::new(DeviceClass::Outlet, "kasa", "10.0.0.5", "sysinfo"))
            .await;

        assert_eq!(response.status, Status::Success);
        assert_eq!(response.result, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_discover_no_devices() {
        let dispatcher = dispatcher(
            Arc::new(MockRunner::new()),
            MockProber::new(),
            MockHueClient::new(200, "{}"),
        );

        let response = dispatcher
            .dispatch(DispatchRequest::new(DeviceClass::Outlet, "kasa", "", "discover"))
            .await;

        assert_eq!(response.error_kind(), Some(ErrorKind::NoDevicesFound));
    }

    #[tokio::test]
    async fn test_light_request_forwards_credential_and_bridge() {
        let hue = Arc::new(MockHueClient::new(200, r#"{"errors":[],"data":[]}"#));
        let dispatcher = Dispatcher::new(Registry::new(Services::mock(
            Arc::new(MockRunner::new()),
            Arc::new(MockProber::new()),
            hue.clone(),
        )));

        let mut request = DispatchRequest::new(DeviceClass::Light, "philips", "abc-123", "on");
        request.credential = Some("secret-key".to_string());
        request.bridge = Some("192.168.101.2".to_string());
        let response = dispatcher.dispatch(request).await;

        assert_eq!(response.status, Status::Success);
        let sent = hue.sent();
        assert_eq!(sent[0].application_key, "secret-key");
        assert_eq!(
            sent[0].url,
            "https://192.168.101.2/clip/v2/resource/light/abc-123"
        );
    }
}
