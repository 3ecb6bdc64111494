/// Decide and evolve an aggregate in one step (no IO).
///
/// 1. `aggregate.handle(command)` decides the events without mutating.
/// 2. Each event is applied in order, bumping the aggregate version.
///
/// On error the aggregate is left untouched, which is what lets the engine
/// reject a transition without any partial state change.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: depotflow_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
