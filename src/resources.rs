/// Concurrency limits derived from CPU and memory availability
///
/// Dense depth profiles dominate memory use: each in-flight sample holds a
/// difference array and a depth array over every qualifying position, plus
/// a copy of the covered depths while the median is selected.
const PROFILE_BYTES_PER_POSITION: u64 = 12;

/// Physical memory currently available, when the platform reports it
pub fn available_memory_bytes() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        // SAFETY: sysconf has no preconditions and only reads system state
        let (pages, page_size) =
            unsafe { (libc::sysconf(libc::_SC_AVPHYS_PAGES), libc::sysconf(libc::_SC_PAGESIZE)) };
        if pages > 0 && page_size > 0 {
            return Some(pages as u64 * page_size as u64);
        }
        None
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

pub fn profile_footprint_bytes(total_qualifying_length: u64) -> u64 {
    total_qualifying_length.saturating_mul(PROFILE_BYTES_PER_POSITION)
}

/// Number of samples to profile at once: the requested thread count, capped
/// by how many depth profiles fit in `available_memory`. Never below 1.
pub fn concurrency_limit(
    requested: usize,
    total_qualifying_length: u64,
    available_memory: Option<u64>,
) -> usize {
    let requested = requested.max(1);
    let footprint = profile_footprint_bytes(total_qualifying_length);

    match available_memory {
        Some(available) if footprint > 0 => {
            let fit = (available / footprint).max(1);
            requested.min(usize::try_from(fit).unwrap_or(usize::MAX))
        }
        _ => requested,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_by_memory() {
        // 1 Mbp reference -> 12 MB per profile
        assert_eq!(concurrency_limit(16, 1_000_000, Some(48_000_000)), 4);
        assert_eq!(concurrency_limit(2, 1_000_000, Some(48_000_000)), 2);
        assert_eq!(concurrency_limit(8, 1_000_000, Some(1_000)), 1);
    }

    #[test]
    fn test_limit_without_memory_information() {
        assert_eq!(concurrency_limit(8, 1_000_000, None), 8);
        assert_eq!(concurrency_limit(8, 0, Some(10)), 8);
        assert_eq!(concurrency_limit(0, 0, None), 1);
    }
}
