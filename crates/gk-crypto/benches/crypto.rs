use gk_crypto::{
    combine_keys, decrypt_field, derive_resource_seed, encrypt_field, DataKey, DerivationPath,
    ExtendedKey, Identity, RemoteKeyContribution,
};

fn make_text(size: usize) -> String {
    (0..size)
        .map(|i| char::from(b'a' + ((i.wrapping_mul(7) ^ (i >> 3)) % 26) as u8))
        .collect()
}

#[divan::bench(args = [16, 256, 4096])]
fn bench_encrypt_field(bencher: divan::Bencher, size: usize) {
    let key = DataKey::from_bytes([0xAB; 32]);
    let text = make_text(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| encrypt_field(divan::black_box(&text), divan::black_box(&key)).unwrap());
}

#[divan::bench(args = [16, 256, 4096])]
fn bench_decrypt_field(bencher: divan::Bencher, size: usize) {
    let key = DataKey::from_bytes([0xAB; 32]);
    let blob = encrypt_field(&make_text(size), &key).unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| decrypt_field(divan::black_box(&blob), divan::black_box(&key)).unwrap());
}

#[divan::bench]
fn bench_derive_identity(bencher: divan::Bencher) {
    let seed = [0x5Au8; 64];
    let path: DerivationPath = gk_crypto::DEFAULT_DERIVATION_PATH.parse().unwrap();
    bencher.bench(|| {
        let leaf = ExtendedKey::derive(divan::black_box(&seed), &path).unwrap();
        Identity::from_key_seed(leaf.key_bytes())
    });
}

#[divan::bench]
fn bench_vault_data_key(bencher: divan::Bencher) {
    let identity = Identity::from_key_seed(&[0x11; 32]);
    let contribution = RemoteKeyContribution::from_bytes(vec![0x22; 48]);
    bencher.bench(|| {
        let seed = derive_resource_seed(&identity, divan::black_box("vault-address"));
        combine_keys(&seed, &contribution).unwrap()
    });
}

fn main() {
    divan::main();
}
