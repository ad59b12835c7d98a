use crate::error::{Error, Result};
use crate::network::{Bus, BusType};

/// Builds 0-based index lists for each type of bus (slack, PV, PQ).
///
/// Exactly one slack bus must be designated before each solve; islanding
/// reassigns roles, so the lists are rebuilt whenever the bus table
/// changes.
pub fn bus_types(bus: &[Bus]) -> Result<(usize, Vec<usize>, Vec<usize>)> {
    let slack = bus
        .iter()
        .filter(|b| b.bus_type == BusType::Slack)
        .map(|b| b.i - 1)
        .collect::<Vec<usize>>();
    let pv = bus
        .iter()
        .filter(|b| b.bus_type == BusType::Pv)
        .map(|b| b.i - 1)
        .collect::<Vec<usize>>();
    let pq = bus
        .iter()
        .filter(|b| b.bus_type == BusType::Pq)
        .map(|b| b.i - 1)
        .collect::<Vec<usize>>();

    match slack.len() {
        0 => Err(Error::NoSlack),
        1 => Ok((slack[0], pv, pq)),
        count => Err(Error::MultipleSlack { count }),
    }
}
