//! Request/response surface used by the control client.
//!
//! Requests are JSON objects of the form
//! `{"method": "runset_state", "params": {"id": 3}}`. Every request gets
//! exactly one response; failures come back as a `fault` carrying the error
//! text.

use super::cnc::CnCServer;
use super::error::CnCError;
use crate::moni::MoniTarget;
use crate::runset::{LogAddress, RunOptions};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Run options as sent by the control client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RunOptionsParams {
    /// `none`, `file`, `live` or `both`. Unset means the server default.
    pub moni_target: Option<String>,
    pub log_host: Option<String>,
    pub log_port: Option<u16>,
    pub live_host: Option<String>,
    pub live_port: Option<u16>,
}

impl RunOptionsParams {
    /// Applies these parameters on top of `base`.
    fn into_options(self, base: RunOptions) -> Result<RunOptions, CnCError> {
        let mut options = base;
        if let Some(target) = self.moni_target {
            let target: MoniTarget = target.parse().map_err(CnCError::BadRequest)?;
            options = options.with_moni_target(target);
        }
        if let Some(address) = endpoint("log", self.log_host, self.log_port)? {
            options = options.with_log(address);
        }
        if let Some(address) = endpoint("live", self.live_host, self.live_port)? {
            options = options.with_live(address);
        }
        Ok(options)
    }
}

fn endpoint(
    kind: &str,
    host: Option<String>,
    port: Option<u16>,
) -> Result<Option<LogAddress>, CnCError> {
    match (host, port) {
        (Some(host), Some(port)) => Ok(Some(LogAddress::new(host, port))),
        (None, None) => Ok(None),
        _ => Err(CnCError::BadRequest(format!(
            "{} host and port must be given together",
            kind
        ))),
    }
}

/// A control-client request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum ControlRequest {
    MakeRunset {
        config: String,
        #[serde(default)]
        run_num: Option<u32>,
    },
    RunsetStartRun {
        id: u32,
        run_num: u32,
        #[serde(default)]
        options: RunOptionsParams,
    },
    RunsetStopRun {
        id: u32,
    },
    RunsetBreak {
        id: u32,
    },
    RunsetListIds,
    RunsetState {
        id: u32,
    },
    RunsetList {
        id: u32,
    },
    ComponentListDicts,
    NumSets,
}

impl ControlRequest {
    pub fn method(&self) -> &'static str {
        match self {
            ControlRequest::MakeRunset { .. } => "make_runset",
            ControlRequest::RunsetStartRun { .. } => "runset_start_run",
            ControlRequest::RunsetStopRun { .. } => "runset_stop_run",
            ControlRequest::RunsetBreak { .. } => "runset_break",
            ControlRequest::RunsetListIds => "runset_list_ids",
            ControlRequest::RunsetState { .. } => "runset_state",
            ControlRequest::RunsetList { .. } => "runset_list",
            ControlRequest::ComponentListDicts => "component_list_dicts",
            ControlRequest::NumSets => "num_sets",
        }
    }
}

/// Reply to a [`ControlRequest`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ControlResponse {
    Ok { result: Value },
    Fault { message: String },
}

impl ControlResponse {
    pub fn is_fault(&self) -> bool {
        matches!(self, ControlResponse::Fault { .. })
    }

    pub fn result(&self) -> Option<&Value> {
        match self {
            ControlResponse::Ok { result } => Some(result),
            ControlResponse::Fault { .. } => None,
        }
    }
}

impl From<Result<Value, CnCError>> for ControlResponse {
    fn from(result: Result<Value, CnCError>) -> Self {
        match result {
            Ok(result) => ControlResponse::Ok { result },
            Err(e) => ControlResponse::Fault {
                message: e.to_string(),
            },
        }
    }
}

impl CnCServer {
    /// Executes one control request.
    pub async fn handle(&self, request: ControlRequest) -> ControlResponse {
        let method = request.method();
        debug!(method, "Control request");
        let response = ControlResponse::from(self.dispatch(request).await);
        if let ControlResponse::Fault { message } = &response {
            warn!(method, error = %message, "Control request failed");
        }
        response
    }

    /// Decodes a JSON request, executes it and encodes the reply.
    pub async fn handle_json(&self, request: &str) -> String {
        let response = match serde_json::from_str::<ControlRequest>(request) {
            Ok(request) => self.handle(request).await,
            Err(e) => ControlResponse::from(Err(CnCError::BadRequest(e.to_string()))),
        };
        serde_json::to_string(&response).unwrap_or_else(|e| {
            json!({ "status": "fault", "message": e.to_string() }).to_string()
        })
    }

    async fn dispatch(&self, request: ControlRequest) -> Result<Value, CnCError> {
        match request {
            ControlRequest::MakeRunset { config, run_num } => {
                let runset = match run_num {
                    Some(run_num) => self.make_runset_for_run(&config, run_num).await?,
                    None => self.make_runset(&config).await?,
                };
                Ok(json!(runset.id()))
            }
            ControlRequest::RunsetStartRun {
                id,
                run_num,
                options,
            } => {
                self.start_run(id, run_num, options.into_options(self.default_options())?).await?;
                Ok(json!("OK"))
            }
            ControlRequest::RunsetStopRun { id } => {
                let had_error = self.stop_run(id).await?;
                Ok(json!(had_error))
            }
            ControlRequest::RunsetBreak { id } => {
                self.break_runset(id).await?;
                Ok(json!("OK"))
            }
            ControlRequest::RunsetListIds => Ok(json!(self.runset_ids())),
            ControlRequest::RunsetState { id } => Ok(json!(self.runset_state(id)?.as_str())),
            ControlRequest::RunsetList { id } => Ok(to_value(self.runset_list(id).await?)?),
            ControlRequest::ComponentListDicts => Ok(to_value(self.component_list().await)?),
            ControlRequest::NumSets => Ok(json!(self.num_sets())),
        }
    }
}

fn to_value<T: Serialize>(value: T) -> Result<Value, CnCError> {
    serde_json::to_value(value).map_err(|e| CnCError::BadRequest(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_requests() {
        let req: ControlRequest =
            serde_json::from_str(r#"{"method": "runset_state", "params": {"id": 4}}"#).unwrap();
        assert_eq!(req, ControlRequest::RunsetState { id: 4 });

        let req: ControlRequest = serde_json::from_str(r#"{"method": "num_sets"}"#).unwrap();
        assert_eq!(req, ControlRequest::NumSets);

        let req: ControlRequest = serde_json::from_str(
            r#"{"method": "runset_start_run",
                "params": {"id": 1, "run_num": 321, "options": {"moni_target": "file"}}}"#,
        )
        .unwrap();
        let ControlRequest::RunsetStartRun { id, run_num, options } = req else {
            panic!("wrong request");
        };
        assert_eq!((id, run_num), (1, 321));
        let options = options.into_options(RunOptions::new()).unwrap();
        assert_eq!(options.moni_target, MoniTarget::File);
    }

    #[test]
    fn test_unset_params_keep_server_defaults() {
        let base = RunOptions::new()
            .with_moni_target(MoniTarget::Both)
            .with_live(LogAddress::new("expcont", 6668));

        let options = RunOptionsParams::default().into_options(base.clone()).unwrap();
        assert_eq!(options, base);
    }

    #[test]
    fn test_run_options_endpoints() {
        let params = RunOptionsParams {
            log_host: Some("loghost".to_string()),
            log_port: Some(9001),
            ..Default::default()
        };
        let options = params.into_options(RunOptions::new()).unwrap();
        assert_eq!(options.log, Some(LogAddress::new("loghost", 9001)));
        assert!(options.live.is_none());

        let params = RunOptionsParams {
            live_port: Some(6666),
            ..Default::default()
        };
        assert!(matches!(
            params.into_options(RunOptions::new()),
            Err(CnCError::BadRequest(_))
        ));
    }

    #[test]
    fn test_bad_moni_target() {
        let params = RunOptionsParams {
            moni_target: Some("carrier pigeon".to_string()),
            ..Default::default()
        };
        assert!(params.into_options(RunOptions::new()).is_err());
    }

    #[test]
    fn test_response_encoding() {
        let ok = ControlResponse::Ok { result: json!(3) };
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({"status": "ok", "result": 3})
        );

        let fault = ControlResponse::from(Err(CnCError::UnknownRunSet(9)));
        assert!(fault.is_fault());
        assert_eq!(
            serde_json::to_value(&fault).unwrap(),
            json!({"status": "fault", "message": "Unknown runset #9"})
        );
    }
}
