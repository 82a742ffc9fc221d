//! Priority tests for rtk-core

use rtk_core::{priority, Priority, ReadySet, MAX_PRIORITIES};

#[test]
fn test_priority_raw() {
    let prio = Priority::new(10);
    assert_eq!(prio.raw(), 10);
    assert_eq!(prio.index(), 10);
}

#[test]
fn test_priority_ordering() {
    let p1 = Priority::new(5);
    let p2 = Priority::new(10);
    assert!(p2 > p1);
    assert!(Priority::IDLE < p1);
}

#[test]
fn test_priority_range() {
    assert!(Priority::new(7).is_within(8));
    assert!(!Priority::new(8).is_within(8));
    assert_eq!(Priority::MAX.index(), MAX_PRIORITIES - 1);
}

#[test]
fn test_priority_macro() {
    const HIGH: Priority = priority!(6);
    assert_eq!(HIGH.raw(), 6);
}

#[test]
fn test_ready_set_highest() {
    let mut set = ReadySet::new();
    set.insert(priority!(1));
    set.insert(priority!(4));
    assert_eq!(set.highest(), Some(priority!(4)));
    set.remove(priority!(4));
    assert_eq!(set.highest(), Some(priority!(1)));
}
