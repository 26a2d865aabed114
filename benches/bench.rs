use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rndc::{encode, decode, Event, Packet, Session, SessionConfig, Table, Value};

const KEY: &str = "c3VwZXItc2VjcmV0LWtleS1tYXRlcmlhbA==";

fn sample_packet() -> Packet {
    let mut data = Table::new();
    data.ensure_table_mut("_data")
        .unwrap()
        .insert("type", Value::from_str("status"));
    Packet::new(Some(42), data).unwrap()
}

fn expect_write(event: Event) -> Vec<u8> {
    match event {
        Event::WantWrite(bytes) => bytes,
        other => panic!("expected want_write, got {other:?}"),
    }
}

pub fn codec(c: &mut Criterion) {
    c.bench_function("encode_packet", |b| {
        let packet = sample_packet();
        b.iter(|| black_box(encode(KEY, &packet).unwrap()))
    });

    c.bench_function("decode_packet", |b| {
        let packet = sample_packet();
        let wire = encode(KEY, &packet).unwrap();

        b.iter(|| black_box(decode(KEY, &wire).unwrap()))
    });
}

pub fn handshake(c: &mut Criterion) {
    c.bench_function("full_client_server_handshake", |b| {
        b.iter(|| {
            let mut client = Session::client(SessionConfig {
                key: Some(KEY.into()),
                command: Some("status".into()),
                nonce: None,
            })
            .unwrap();
            let mut server = Session::server(
                SessionConfig {
                    key: Some(KEY.into()),
                    command: None,
                    nonce: Some(7),
                },
                Box::new(|cmd| format!("ran {cmd}")),
            )
            .unwrap();

            server.start();
            let opening = expect_write(client.start());
            let challenge = expect_write(server.next(Some(&opening)));
            client.next(None);
            let response = expect_write(client.next(Some(&challenge)));
            server.next(None);
            let result = expect_write(server.next(Some(&response)));
            server.next(None);
            client.next(None);
            black_box(client.next(Some(&result)))
        })
    });
}

criterion_group!(benches, codec, handshake);
criterion_main!(benches);
