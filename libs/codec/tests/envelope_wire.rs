//! Wire-level tests: envelopes as a producer in another process would see them

use fleet_codec::{strip_terminator, CodecError, Envelope};
use fleet_types::{topics, ConsoleLogMessage, ServiceState, ServiceStatus};

#[test]
fn test_stream_of_lines_decodes_in_order() {
    let statuses = [ServiceState::Initializing, ServiceState::Running, ServiceState::Stopped];
    let stream: String = statuses
        .iter()
        .map(|state| {
            let status = ServiceStatus {
                name: "billing".into(),
                running_instances: 1,
                state: *state,
                last_report_at: None,
                last_healthy: None,
            };
            Envelope::from_value(topics::SERVICE_STATUS, &status)
                .unwrap()
                .to_line()
                .unwrap()
        })
        .collect();

    let decoded: Vec<ServiceState> = stream
        .split_inclusive('\n')
        .map(|line| Envelope::from_line(line).unwrap())
        .map(|envelope| envelope.decode_payload::<ServiceStatus>().unwrap().state)
        .collect();
    assert_eq!(decoded, statuses);
}

#[test]
fn test_foreign_producer_line_is_accepted() {
    // CRLF, `type` instead of `payloadType`, offset timestamp
    let line = "{\"topic\":\"ConsoleLogMessage\",\"type\":\"ConsoleLogMessage\",\
                \"payload\":{\"name\":\"worker\",\"isHealthy\":false,\"details\":\"exit 1\",\
                \"timestamp\":\"2024-05-01T12:00:00Z\"},\
                \"timestamp\":\"2024-05-01T14:00:00+02:00\"}\r\n";

    let envelope = Envelope::from_line(line).unwrap();
    assert_eq!(envelope.topic, topics::CONSOLE_LOG);
    assert_eq!(envelope.payload_type, "ConsoleLogMessage");
    assert_eq!(envelope.timestamp.to_rfc3339(), "2024-05-01T12:00:00+00:00");

    let message: ConsoleLogMessage = envelope.decode_payload().unwrap();
    assert_eq!(message.pid, -1);
    assert!(!message.is_healthy);
    assert_eq!(message.details.as_deref(), Some("exit 1"));
}

#[test]
fn test_unrelated_payload_is_type_mismatch() {
    let envelope = Envelope::from_value(topics::SERVICE_STATUS, &"not a status").unwrap();
    let err = envelope.decode_payload::<ServiceStatus>().unwrap_err();
    assert!(matches!(err, CodecError::TypeMismatch { .. }));
}

#[test]
fn test_partial_line_is_not_a_frame() {
    let line = Envelope::from_value("jobs", &1u32).unwrap().to_line().unwrap();
    let (head, _) = line.split_at(line.len() / 2);
    assert!(strip_terminator(head).is_none());
    assert!(strip_terminator(&line).is_some());
}
