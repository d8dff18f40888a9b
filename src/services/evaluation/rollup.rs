use super::types::Verdict;

/// Combines per-metric verdicts into one site-level result.
///
/// Any Fail dominates (mixed Fail and Restored is still Fail); otherwise a
/// single Restored carries through; Inconclusive metrics never force a Fail
/// and only win when every metric is Inconclusive. Counting makes the result
/// independent of metric ordering.
pub fn roll_up<I>(verdicts: I) -> Verdict
where
    I: IntoIterator<Item = Verdict>,
{
    let mut fails = 0usize;
    let mut restored = 0usize;
    let mut passes = 0usize;

    for verdict in verdicts {
        match verdict {
            Verdict::Fail => fails += 1,
            Verdict::Restored => restored += 1,
            Verdict::Pass => passes += 1,
            Verdict::Inconclusive => {}
        }
    }

    if fails > 0 {
        Verdict::Fail
    } else if restored > 0 {
        Verdict::Restored
    } else if passes > 0 {
        Verdict::Pass
    } else {
        Verdict::Inconclusive
    }
}
