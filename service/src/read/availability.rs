//! Combined availability verdict of an [`Item`].

use derive_more::{Display, Error, From};

use crate::domain::{booking, Item};

use super::{
    capacity::{InsufficientCapacity, SlotAvailability},
    overlap::{Conflict, Holds},
};

/// Current availability of an [`Item`] relevant to a reservation.
#[derive(Clone, Debug, From)]
pub enum Availability {
    /// [`SlotAvailability`] on the requested date of a slot-based [`Item`].
    Slots(SlotAvailability),

    /// [`Holds`] of a facility-based [`Item`].
    Facilities(Holds),
}

impl Availability {
    /// Checks whether a reservation with the provided [`booking::Detail`] fits
    /// into this [`Availability`] of the [`Item`].
    ///
    /// # Errors
    ///
    /// With the [`Shortage`] preventing the reservation.
    pub fn admit(
        &self,
        item: &Item,
        detail: &booking::Detail,
    ) -> Result<(), Shortage> {
        match self {
            Self::Slots(slots) => Ok(slots.admit(detail.units())?),
            Self::Facilities(holds) => {
                for sel in detail.facilities() {
                    // Unknown facilities never pass validation.
                    let Some(facility) = item.facility(&sel.name) else {
                        continue;
                    };
                    if let Some(conflict) = holds.conflict(facility, sel.range)
                    {
                        return Err(conflict.into());
                    }
                }
                Ok(())
            }
        }
    }
}

/// Reason a reservation doesn't fit into an [`Availability`].
#[derive(Clone, Debug, Display, Error, From)]
pub enum Shortage {
    /// Not enough slots remain.
    InsufficientCapacity(InsufficientCapacity),

    /// Requested facility range is already taken.
    FacilityConflict(Conflict),
}
