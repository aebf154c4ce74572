/*
Time helpers for the network models.

Every sub-network of the hybrid network runs in its own clock domain. Delays are computed
in the domain of the component that produced them and converted before being added to a
running total kept in another domain. Conversion always rounds up: a fractional cycle in
the target domain occupies a full cycle.

Frequencies are expressed in GHz, so converting to a domain of frequency 1.0 yields
nanoseconds.
*/

pub type Cycle = u64;

/// Frequency in GHz.
pub type Frequency = f64;

/// Converts `count` cycles of a clock running at `from` into cycles of a clock running at `to`.
pub fn convert_cycle_count(count: Cycle, from: Frequency, to: Frequency) -> Cycle {
    debug_assert!(from > 0.0 && to > 0.0, "frequencies must be positive");
    (count as f64 / (from / to)).ceil() as Cycle
}

/// Cycles needed to push `length_bytes` through a channel of `bandwidth` bits per cycle.
pub fn processing_time(length_bytes: u32, bandwidth: f64) -> Cycle {
    debug_assert!(bandwidth > 0.0, "bandwidth must be > 0");
    ((length_bytes as f64 * 8.0) / bandwidth).ceil() as Cycle
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_rounds_up() {
        // 3 cycles at 1 GHz take 3 ns, which is 6 cycles at 2 GHz
        assert_eq!(6, convert_cycle_count(3, 1.0, 2.0));
        // 3 cycles at 2 GHz take 1.5 ns, charged as 2 cycles at 1 GHz
        assert_eq!(2, convert_cycle_count(3, 2.0, 1.0));
        assert_eq!(0, convert_cycle_count(0, 2.0, 1.0));
    }

    #[test]
    fn conversion_round_trip_never_loses_cycles() {
        let domains = [(1.0, 2.0), (2.0, 1.0), (1.0, 3.0), (3.0, 1.0), (1.5, 2.5), (0.7, 1.1)];
        for (a, b) in domains {
            for x in 0..2_000u64 {
                let there = convert_cycle_count(x, a, b);
                let back = convert_cycle_count(there, b, a);
                assert!(back >= x, "x={x} a={a} b={b} there={there} back={back}");
            }
        }
    }

    #[test]
    fn processing_time_covers_partial_flits() {
        assert_eq!(1, processing_time(8, 64.0));
        assert_eq!(2, processing_time(9, 64.0));
        assert_eq!(0, processing_time(0, 64.0));
        assert_eq!(3, processing_time(8, 25.6));
    }
}
