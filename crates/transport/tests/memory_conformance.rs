//! Runs the backend conformance suite against the in-memory emulator.

use fieldops_transport::conformance::run_conformance_suite;
use fieldops_transport::MemoryTransport;

#[tokio::test]
async fn memory_transport_passes_conformance() {
    let report =
        run_conformance_suite(|| async { MemoryTransport::new().with_chunk_size(16 * 1024) })
            .await;
    assert!(report.total > 20, "suite ran only {} tests", report.total);
    assert_eq!(report.failed, 0, "{report}");
}
