// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use stun_wire::builder::MessageBuilder;
use stun_wire::credentials::ShortTermCredentials;
use stun_wire::message::{MessageType, TransactionId};
use stun_wire::parser::Parser;

fn binding_builder() -> MessageBuilder {
    MessageBuilder::new(MessageType::BINDING_REQUEST, TransactionId::default())
}

fn bench_parse(c: &mut Criterion) {
    let mut builder = binding_builder();
    builder.add_fingerprint();
    let fingerprint_msg = builder.build().unwrap();

    let mut builder = binding_builder();
    builder.set_password(b"secret");
    builder.add_message_integrity();
    let integrity_msg = builder.build().unwrap();

    let mut builder = binding_builder();
    builder.set_password(b"secret");
    builder.add_message_integrity_sha256();
    let integrity_sha256_msg = builder.build().unwrap();

    let credentials = ShortTermCredentials::new(&b"secret"[..]);

    c.bench_function("parse/fingerprint", |b| {
        let parser = Parser::new();
        b.iter(|| parser.parse(black_box(&fingerprint_msg)).unwrap())
    });
    c.bench_function("parse/message-integrity", |b| {
        let parser = Parser::with_credentials(&credentials);
        b.iter(|| parser.parse(black_box(&integrity_msg)).unwrap())
    });
    c.bench_function("parse/message-integrity-sha256", |b| {
        let parser = Parser::with_credentials(&credentials);
        b.iter(|| parser.parse(black_box(&integrity_sha256_msg)).unwrap())
    });
}

criterion_group!(benches, bench_parse);
criterion_main!(benches);
