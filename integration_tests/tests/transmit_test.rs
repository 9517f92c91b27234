use canhost::transmit::TransmitError;
use integration_tests::prelude::*;

#[test]
fn test_frame_timeout_budget() {
    let config = SessionConfig::DEFAULT;
    let mbox = HostMbox::new(config);
    let bus = SimBus::new(config);
    bus.set_busy_polls(None);
    let mut session = new_session(config, &mbox, &bus);

    assert_eq!(
        UserMessage::NetworkFailed,
        session.dispatch(CommandCode::ReadVersion, None)
    );
    // 5000 checks, 1 ms apart
    assert_eq!(5000, bus.total_polls());
    assert_eq!(5_000_000, session.transmitter().delay().total_us);
}

#[test]
fn test_send_integer() {
    let config = SessionConfig::DEFAULT;
    let mbox = HostMbox::new(config);
    let bus = SimBus::new(config);
    bus.set_busy_polls(Some(2));
    let mut session = new_session(config, &mbox, &bus);

    session
        .transmitter()
        .send_integer(config.can.sensor(), 0xDEADBEEF)
        .unwrap();
    assert_eq!(3, bus.total_polls());
    assert_eq!(200, session.transmitter().delay().total_us);

    let sent = bus.requests();
    assert_eq!(1, sent.len());
    assert_eq!(&[0xEF, 0xBE, 0xAD, 0xDE], sent[0].data());

    bus.set_busy_polls(None);
    assert_eq!(
        Err(TransmitError::Timeout { polls: 0x1000 }),
        session.transmitter().send_integer(config.can.sensor(), 1)
    );
    assert_eq!(3 + 0x1000, bus.total_polls());
}
