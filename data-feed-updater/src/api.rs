//! The HTTP API of the updater
//!
//! Signed observations are pushed in over `POST /observations` and land in
//! the shared observation cache that the update loops read from.

use std::{convert::Infallible, future::Future, net::SocketAddr};

use alloy_primitives::{Bytes, B256};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use tracing::{debug, info, info_span};
use warp::{
    filters::BoxedFilter, http::StatusCode, hyper::body::Bytes as BodyBytes, Filter, Rejection,
    Reply,
};

use crate::{
    error::{handle_rejection, ApiError, UpdaterError, UpdaterResult},
    state::State,
    types::SignedObservation,
};

/// The path of the liveness route
const PING_PATH: &str = "ping";
/// The path of the observation ingestion route
const OBSERVATIONS_PATH: &str = "observations";
/// The path of the gas price snapshot route
const GAS_PRICES_PATH: &str = "gas-prices";

// ---------
// | Types |
// ---------

/// A signed observation pushed to the updater
#[derive(Clone, Debug, Deserialize)]
pub struct ObservationRequest {
    /// The beacon the observation is for
    pub beacon_id: B256,
    /// The ABI-encoded `int256` value
    pub value: Bytes,
    /// The unix timestamp (seconds) as a decimal string
    pub timestamp: String,
    /// The airnode signature
    pub signature: Bytes,
}

impl ObservationRequest {
    /// Validate the request against the configured beacons and convert it
    /// into a cacheable observation
    pub fn into_observation(self, state: &State) -> Result<(B256, SignedObservation), ApiError> {
        if state.config().beacon(&self.beacon_id).is_none() {
            return Err(ApiError::bad_request(format!("unknown beacon {}", self.beacon_id)));
        }

        let timestamp: u64 = self
            .timestamp
            .parse()
            .map_err(|e| ApiError::bad_request(format!("invalid timestamp: {e}")))?;
        let observation =
            SignedObservation { value: self.value, timestamp, signature: self.signature };
        observation.decoded_value().map_err(ApiError::bad_request)?;

        Ok((self.beacon_id, observation))
    }
}

// ----------
// | Routes |
// ----------

/// Build the routes of the HTTP API
#[allow(clippy::needless_pass_by_value)]
pub fn routes(state: State) -> BoxedFilter<(impl Reply,)> {
    let ping = warp::get()
        .and(warp::path(PING_PATH))
        .and(warp::path::end())
        .map(|| warp::reply::json(&json!({ "message": "PONG" })));

    let post_observation = warp::post()
        .and(warp::path(OBSERVATIONS_PATH))
        .and(warp::path::end())
        .and(warp::body::bytes())
        .map(with_json_body::<ObservationRequest>)
        .and_then(identity)
        .and(with_state(state.clone()))
        .and_then(handle_post_observation);

    let gas_prices = warp::get()
        .and(warp::path(GAS_PRICES_PATH))
        .and(warp::path::end())
        .and(with_state(state))
        .map(|state: State| warp::reply::json(&state.gas_price_snapshot()));

    ping.or(post_observation).or(gas_prices).with(with_tracing()).recover(handle_rejection).boxed()
}

/// Bind the HTTP API to the given port
///
/// Returns the bound address and the server future, which serves requests
/// until dropped.
pub fn bind(
    state: State,
    port: u16,
) -> UpdaterResult<(SocketAddr, impl Future<Output = ()> + Send + 'static)> {
    let listen_addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let (addr, server) = warp::serve(routes(state))
        .try_bind_ephemeral(listen_addr)
        .map_err(|e| UpdaterError::http_server(format!("cannot bind {listen_addr}: {e}")))?;

    info!("serving HTTP API on {addr}");
    Ok((addr, server))
}

// ------------
// | Handlers |
// ------------

/// Cache a pushed observation, replacing the previous one for its beacon
async fn handle_post_observation(
    req: ObservationRequest,
    state: State,
) -> Result<impl Reply, Rejection> {
    let (beacon_id, observation) = req.into_observation(&state)?;
    debug!(%beacon_id, timestamp = observation.timestamp, "received observation");
    state.set_observation(beacon_id, observation);

    let reply = warp::reply::json(&json!({ "beacon_id": beacon_id }));
    Ok(warp::reply::with_status(reply, StatusCode::OK))
}

// --------------
// | Middleware |
// --------------

/// Clone the state into a filter
fn with_state(state: State) -> impl Filter<Extract = (State,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// Deserialize a JSON body, rejecting with a bad request on failure
#[allow(clippy::needless_pass_by_value)]
fn with_json_body<T: DeserializeOwned + Send>(body: BodyBytes) -> Result<T, Rejection> {
    serde_json::from_slice(&body).map_err(|e| {
        warp::reject::custom(ApiError::bad_request(format!("Invalid JSON request body: {e}")))
    })
}

/// Identity map, used to lift a `map`ped result into an `and_then`
async fn identity<T>(res: T) -> T {
    res
}

/// Open an info level span for each request
fn with_tracing() -> warp::trace::Trace<impl Fn(warp::trace::Info) -> tracing::Span + Clone> {
    warp::trace(|info| {
        info_span!(
            target: "data_feed_updater::request",
            "handle_request",
            method = %info.method(),
            path = %info.path(),
        )
    })
}

#[cfg(test)]
mod tests {
    use alloy_primitives::I256;
    use serde_json::Value;

    use super::*;
    use crate::{
        abi::encode_beacon_value,
        chain::ProviderPool,
        gas_oracle::BlockSample,
        state::GasOracleKey,
        test_utils::{beacon_a, mock_config, CHAIN_ID},
    };

    /// Build a state without providers
    fn state() -> State {
        State::new(mock_config(), ProviderPool::new())
    }

    /// Build an observation request body
    fn body(beacon_id: B256, value: Bytes, timestamp: &str) -> Value {
        json!({
            "beacon_id": beacon_id,
            "value": value,
            "timestamp": timestamp,
            "signature": Bytes::from(vec![0xab; 65]),
        })
    }

    /// Tests that a port already in use is reported rather than served
    #[tokio::test]
    async fn test_bind_port_in_use() {
        let (addr, _server) = bind(state(), 0).unwrap();
        assert_ne!(addr.port(), 0);

        let res = bind(state(), addr.port());
        assert!(matches!(res, Err(UpdaterError::HttpServer(_))));
    }

    /// Tests the ping route
    #[tokio::test]
    async fn test_ping() {
        let res = warp::test::request().method("GET").path("/ping").reply(&routes(state())).await;

        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["message"], "PONG");
    }

    /// Tests that a valid observation is cached
    #[tokio::test]
    async fn test_post_observation() {
        let state = state();
        let value = encode_beacon_value(I256::try_from(1234).unwrap());
        let res = warp::test::request()
            .method("POST")
            .path("/observations")
            .json(&body(beacon_a(), value.clone(), "1700000000"))
            .reply(&routes(state.clone()))
            .await;

        assert_eq!(res.status(), StatusCode::OK);
        let cached = state.observation(&beacon_a()).unwrap();
        assert_eq!(cached.value, value);
        assert_eq!(cached.timestamp, 1_700_000_000);
    }

    /// Tests that invalid observations are rejected and not cached
    #[tokio::test]
    async fn test_post_invalid_observation() {
        let state = state();
        let value = encode_beacon_value(I256::try_from(1).unwrap());
        let cases = [
            body(B256::repeat_byte(0x77), value.clone(), "1"),
            body(beacon_a(), Bytes::from(vec![1, 2, 3]), "1"),
            body(beacon_a(), value, "not a number"),
        ];

        for case in cases {
            let res = warp::test::request()
                .method("POST")
                .path("/observations")
                .json(&case)
                .reply(&routes(state.clone()))
                .await;
            assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        }

        let res = warp::test::request()
            .method("POST")
            .path("/observations")
            .body("{")
            .reply(&routes(state.clone()))
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(state.observation(&beacon_a()).is_none());
    }

    /// Tests the gas price snapshot route
    #[tokio::test]
    async fn test_gas_prices() {
        let state = state();
        state.update_gas_window(&GasOracleKey::new(CHAIN_ID, "local"), |w| {
            w.record(3, vec![BlockSample { number: 3, gas_prices: vec![10, 20] }], 20, 100)
        });
        state.update_gas_window(&GasOracleKey::new(CHAIN_ID, "backup"), |_| ());

        let res =
            warp::test::request().method("GET").path("/gas-prices").reply(&routes(state)).await;

        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body[0]["provider"], "backup");
        assert!(body[0]["gas_price"].is_null());
        assert_eq!(body[1]["provider"], "local");
        assert_eq!(body[1]["latest_block"], 3);
    }
}
