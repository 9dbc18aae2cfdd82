// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn occupied(suffixes: impl IntoIterator<Item = u8>) -> HashSet<Ipv4Addr> {
    suffixes.into_iter().map(host_ip).collect()
}

#[test]
fn allocated_ip_is_inside_the_pool() {
    let mut rng = StdRng::seed_from_u64(7);
    let ip = allocate_ip(&HashSet::new(), &mut rng).unwrap();
    let suffix = ip.octets()[3];
    assert!((SUFFIX_MIN..=SUFFIX_MAX).contains(&suffix));
    assert_eq!(&ip.octets()[..3], &[192, 168, 100]);
}

#[test]
fn allocation_skips_occupied_addresses() {
    let mut rng = StdRng::seed_from_u64(7);
    let taken = occupied(SUFFIX_MIN..=SUFFIX_MAX - 1);
    // Only .254 left; random draws must keep rejecting until the scan finds it.
    let ip = allocate_ip(&taken, &mut rng).unwrap();
    assert_eq!(ip, host_ip(SUFFIX_MAX));
}

#[test]
fn full_pool_reports_exhaustion() {
    let mut rng = StdRng::seed_from_u64(7);
    let taken = occupied(SUFFIX_MIN..=SUFFIX_MAX);
    assert_eq!(allocate_ip(&taken, &mut rng), Err(NetError::PoolExhausted));
}

#[test]
fn successive_allocations_never_collide() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut taken = HashSet::new();
    for _ in SUFFIX_MIN..=SUFFIX_MAX {
        let ip = allocate_ip(&taken, &mut rng).unwrap();
        assert!(taken.insert(ip), "allocator returned {ip} twice");
    }
    assert_eq!(allocate_ip(&taken, &mut rng), Err(NetError::PoolExhausted));
}

#[test]
fn default_bridge_name_fits_the_interface_limit() {
    assert!(BRIDGE_NAME.len() <= IFNAME_MAX);
    assert!(validate_bridge_name(BRIDGE_NAME).is_ok());
}

#[test]
fn overlong_bridge_name_is_rejected() {
    let name = "wso-virbr-overlong";
    assert_eq!(
        validate_bridge_name(name),
        Err(NetError::BridgeNameTooLong(name.to_string()))
    );
}
