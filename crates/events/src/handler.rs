/// Decide and apply in one step, without a store.
///
/// Used by unit tests and by in-process flows that don't persist (previewing
/// an allocation, for instance). The dispatcher in `stockor-infra` is the
/// persisted equivalent.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: stockor_core::Aggregate,
{
    let events = aggregate.handle(command)?;
    for ev in &events {
        aggregate.apply(ev);
    }
    Ok(events)
}
