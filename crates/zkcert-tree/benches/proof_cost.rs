// proof generation cost: binary poseidon tree vs width-16 verkle tree
// holding the same 4096 leaves

use ark_std::UniformRand;
use criterion::{criterion_group, criterion_main, Criterion};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use std::sync::Arc;
use zkcert_field::{Fr, Srs};
use zkcert_tree::{CommitmentTree, PoseidonHash, SparseMerkleTree, VerkleTree};

const LEAVES: u64 = 4096;

fn bench_proofs(c: &mut Criterion) {
    let mut rng = ChaCha20Rng::seed_from_u64(1);
    let indices: Vec<u64> = (0..LEAVES).collect();
    let values: Vec<Fr> = indices.iter().map(|_| Fr::rand(&mut rng)).collect();

    let mut sparse = SparseMerkleTree::new(32, PoseidonHash::new().unwrap()).unwrap();
    sparse.insert_leaves(&values, &indices).unwrap();

    let srs = Arc::new(Srs::insecure_from_tau(Fr::rand(&mut rng), 15));
    let mut verkle = VerkleTree::new(8, 16, srs).unwrap();
    verkle.insert_leaves(&values, &indices).unwrap();

    let mut group = c.benchmark_group("create_proof");
    group.bench_function("sparse_depth32", |b| {
        b.iter(|| sparse.create_proof(1234).unwrap())
    });
    group.bench_function("verkle_w16_depth8", |b| {
        b.iter(|| verkle.create_proof(1234).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_proofs);
criterion_main!(benches);
