//! Control plane integration tests over in-memory adapters.
//!
//! Tests are organized into modules by functionality:
//! - `deploy_flow_tests`: Deploy, review, cancel and environment locking
//! - `scan_flow_tests`: Mirror and direct scans with result reconciliation
//! - `api_tests`: HTTP routes driven through `tower::ServiceExt::oneshot`

mod test_helpers;

mod control_plane {
    mod api_tests;
    mod deploy_flow_tests;
    mod scan_flow_tests;
}
