use criterion::{black_box, criterion_group, criterion_main, Criterion};
use paycode_lib::{decode_payment_code, signer, ChainDeriver, PaymentCode, PaymentCodeKeys, SsoChallenge};

fn owned_record(keys: &PaymentCodeKeys) -> PaymentCode {
    let code = keys.payment_code();
    let decoded = decode_payment_code(&code).unwrap();
    PaymentCode::from_decoded("bench".to_string(), code, "Bench", &decoded)
}

fn chain_benchmark(c: &mut Criterion) {
    let sender = PaymentCodeKeys::from_seed(b"bench sender").unwrap();
    let recipient = PaymentCodeKeys::from_seed(b"bench recipient").unwrap();
    let sender_code = owned_record(&sender);
    let recipient_code = recipient.payment_code();
    let deriver = ChainDeriver::default();

    c.bench_function("derive_chain_20", |b| {
        b.iter(|| {
            deriver.derive_chain(
                black_box(&sender_code),
                black_box(&sender),
                black_box(&recipient_code),
                "Recipient",
                20,
            )
        })
    });

    c.bench_function("decode_payment_code", |b| {
        b.iter(|| decode_payment_code(black_box(&recipient_code)))
    });
}

fn signature_benchmark(c: &mut Criterion) {
    let keys = PaymentCodeKeys::from_seed(b"bench signer").unwrap().with_sphincs();
    let code = owned_record(&keys);
    let challenge = SsoChallenge {
        challenge: "bench-challenge".to_string(),
        service_name: "Bench".to_string(),
        service_url: "https://bench.example.com".to_string(),
        timestamp: chrono::Utc::now().timestamp_millis(),
        nonce: "bench-nonce".to_string(),
    };

    c.bench_function("sign_ecdsa", |b| {
        b.iter(|| signer::sign(black_box(&challenge), &code, &keys, false))
    });

    c.bench_function("sign_hybrid", |b| {
        b.iter(|| signer::sign(black_box(&challenge), &code, &keys, true))
    });

    let bundle = signer::sign(&challenge, &code, &keys, true).unwrap();
    c.bench_function("verify_hybrid", |b| {
        b.iter(|| signer::verify(black_box(&bundle), black_box(&challenge)))
    });
}

criterion_group!(benches, chain_benchmark, signature_benchmark);
criterion_main!(benches);
