//! GCS call layer against a simulated controller over TCP

mod common;

use std::time::Duration;

use pigcs_rs::gcs::{Connection, GcsDevice, GcsError, PiErrorCode};

async fn connect(port: u16) -> GcsDevice {
    let connection = Connection::Tcp {
        host: "127.0.0.1".into(),
        port,
    };
    GcsDevice::connect(connection, Duration::from_secs(1)).await.unwrap()
}

#[tokio::test]
async fn test_identification_and_axes() {
    let server = common::hexapod_sim(true).await;
    let mut dev = connect(server.port()).await;
    assert!(dev.idn().await.unwrap().contains("C-887"));
    assert_eq!(dev.axis_names().await.unwrap(), vec!["X", "Y", "Z", "U", "V", "W"]);
    let positions = dev.positions().await.unwrap();
    assert_eq!(positions.len(), 6);
    assert_eq!(positions["Z"], 0.0);
    let units = dev.units().await.unwrap();
    assert_eq!(units["X"], "mm");
    assert_eq!(units["U"], "deg");
}

#[tokio::test]
async fn test_motion_mask_follows_axis_order() {
    let server = common::generic_sim(&["A", "B", "C"], true).await;
    let mut dev = connect(server.port()).await;
    let axes = dev.axis_names().await.unwrap();
    dev.move_to(&[("C", 4.0)]).await.unwrap();
    let moving = dev.moving(&axes).await.unwrap();
    assert!(!moving["A"]);
    assert!(!moving["B"]);
    assert!(moving["C"]);

    server.advance(Duration::from_secs(1));
    let moving = dev.moving(&axes).await.unwrap();
    assert!(moving.values().all(|m| !m));
    assert_eq!(dev.positions().await.unwrap()["C"], 4.0);
}

#[tokio::test]
async fn test_controller_errors_are_decoded() {
    let server = common::generic_sim(&["A"], false).await;
    let mut dev = connect(server.port()).await;
    match dev.move_to(&[("A", 1.0)]).await {
        Err(GcsError::ControllerError { code, error, .. }) => {
            assert_eq!(code, 5);
            assert_eq!(error, Some(PiErrorCode::MoveWithoutRefOrNoServo));
        }
        other => panic!("expected controller error, got {other:?}"),
    }
    // ERR? clears the error.
    assert_eq!(dev.last_error().await.unwrap(), 0);

    let err = dev.command("BOGUS").await.unwrap_err();
    assert!(matches!(err, GcsError::ControllerError { code: 2, .. }));
}

#[tokio::test]
async fn test_halt_and_stop_tolerate_controller_stopped() {
    let server = common::generic_sim(&["A"], true).await;
    let mut dev = connect(server.port()).await;
    dev.move_to(&[("A", 50.0)]).await.unwrap();
    dev.halt().await.unwrap();
    dev.move_to(&[("A", -50.0)]).await.unwrap();
    dev.stop_all().await.unwrap();
    assert_eq!(server.with_controller(|s| s.any_moving()), Some(false));
}

#[tokio::test]
async fn test_hexapod_queries() {
    let server = common::hexapod_sim(true).await;
    let mut dev = connect(server.port()).await;
    assert!(dev.can_move_to(&[("X", 10.0)]).await.unwrap());
    assert!(!dev.can_move_to(&[("X", 80.0)]).await.unwrap());

    dev.set_system_velocity(2.5).await.unwrap();
    assert_eq!(dev.system_velocity().await.unwrap(), 2.5);

    dev.set_pivot_point([1.0, -2.0, 3.0]).await.unwrap();
    assert_eq!(dev.pivot_point().await.unwrap(), [1.0, -2.0, 3.0]);

    let tmn = dev.travel_min().await.unwrap();
    let tmx = dev.travel_max().await.unwrap();
    assert_eq!((tmn["Z"], tmx["Z"]), (-25.0, 25.0));
}

#[tokio::test]
async fn test_closed_connection_is_reported() {
    let server = common::hexapod_sim(true).await;
    let mut dev = connect(server.port()).await;
    server.shutdown();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let err = dev.idn().await.unwrap_err();
    assert!(err.is_connection_error(), "unexpected error {err:?}");
}
