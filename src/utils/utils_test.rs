use crate::convert::fnv1a_32;
use crate::convert::safe_kv;

#[test]
fn test_fnv1a_32_known_vectors() {
    assert_eq!(fnv1a_32(""), 0x811c_9dc5);
    assert_eq!(fnv1a_32("a"), 0xe40c_292c);
    assert_eq!(fnv1a_32("foobar"), 0xbf9c_f968);
}

#[test]
fn test_safe_kv_is_big_endian() {
    assert_eq!(safe_kv(1), [0, 0, 0, 0, 0, 0, 0, 1]);
    // big-endian keys keep sled iteration in numeric order
    assert!(safe_kv(255) < safe_kv(256));
}

#[test]
fn test_device_hash_distinguishes_phys() {
    assert_ne!(fnv1a_32("IEEE802.11"), fnv1a_32("Bluetooth"));
}
