use std::collections::BTreeMap;
use std::fmt;

use crate::SamplerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OperationId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlightId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CategoryId(pub usize);

/// Start of a screening time window, in the model's time unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeWindow(pub u32);

/// A passenger group: the passengers of one risk category on one flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    pub flight: FlightId,
    pub category: CategoryId,
}

impl GroupKey {
    pub fn new(flight: FlightId, category: CategoryId) -> Self {
        Self { flight, category }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "o{}", self.0)
    }
}

impl fmt::Display for FlightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.flight, self.category)
    }
}

#[derive(Debug, Clone)]
pub struct ScreeningResource {
    pub name: String,
    pub capacity_per_unit: u32,
    pub units: u32,
}

impl ScreeningResource {
    /// Passengers the installed units can screen in one time window.
    pub fn capacity(&self) -> u64 {
        self.capacity_per_unit as u64 * self.units as u64
    }
}

#[derive(Debug, Clone)]
pub struct ScreeningOperation {
    pub name: String,
    pub resources: Vec<ResourceId>,
}

#[derive(Debug, Clone)]
pub struct RiskCategory {
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Flight {
    pub name: String,
}

/// Static description of a screening checkpoint: its resources, the
/// operations built from them, and the passengers expected per time window.
#[derive(Debug, Clone, Default)]
pub struct ScreeningModel {
    resources: Vec<ScreeningResource>,
    operations: Vec<ScreeningOperation>,
    categories: Vec<RiskCategory>,
    flights: Vec<Flight>,
    schedule: BTreeMap<TimeWindow, BTreeMap<FlightId, BTreeMap<CategoryId, u32>>>,
}

impl ScreeningModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_resource(
        &mut self,
        name: impl Into<String>,
        capacity_per_unit: u32,
        units: u32,
    ) -> ResourceId {
        let id = ResourceId(self.resources.len());
        self.resources.push(ScreeningResource {
            name: name.into(),
            capacity_per_unit,
            units,
        });
        id
    }

    pub fn add_operation(
        &mut self,
        name: impl Into<String>,
        resources: &[ResourceId],
    ) -> Result<OperationId, SamplerError> {
        let mut seen = Vec::with_capacity(resources.len());
        for &resource in resources {
            if resource.0 >= self.resources.len() {
                return Err(SamplerError::InvalidInput(format!(
                    "operation uses unknown resource {resource}"
                )));
            }
            if seen.contains(&resource) {
                return Err(SamplerError::InvalidInput(format!(
                    "operation lists resource {resource} twice"
                )));
            }
            seen.push(resource);
        }
        let id = OperationId(self.operations.len());
        self.operations.push(ScreeningOperation {
            name: name.into(),
            resources: seen,
        });
        Ok(id)
    }

    pub fn add_category(&mut self, name: impl Into<String>) -> CategoryId {
        let id = CategoryId(self.categories.len());
        self.categories.push(RiskCategory { name: name.into() });
        id
    }

    pub fn add_flight(&mut self, name: impl Into<String>) -> FlightId {
        let id = FlightId(self.flights.len());
        self.flights.push(Flight { name: name.into() });
        id
    }

    /// Records how many passengers of `category` on `flight` pass the
    /// checkpoint during `window`. Scheduling a flight in a window makes every
    /// category of that flight a group of the window.
    pub fn set_passengers(
        &mut self,
        window: TimeWindow,
        flight: FlightId,
        category: CategoryId,
        passengers: u32,
    ) -> Result<(), SamplerError> {
        if flight.0 >= self.flights.len() {
            return Err(SamplerError::UnknownReference {
                window,
                kind: "flight",
                id: flight.0,
            });
        }
        if category.0 >= self.categories.len() {
            return Err(SamplerError::UnknownReference {
                window,
                kind: "category",
                id: category.0,
            });
        }
        self.schedule
            .entry(window)
            .or_default()
            .entry(flight)
            .or_default()
            .insert(category, passengers);
        Ok(())
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn operation_count(&self) -> usize {
        self.operations.len()
    }

    pub fn resource(&self, id: ResourceId) -> Option<&ScreeningResource> {
        self.resources.get(id.0)
    }

    pub fn operation(&self, id: OperationId) -> Option<&ScreeningOperation> {
        self.operations.get(id.0)
    }

    pub fn category(&self, id: CategoryId) -> Option<&RiskCategory> {
        self.categories.get(id.0)
    }

    pub fn flight(&self, id: FlightId) -> Option<&Flight> {
        self.flights.get(id.0)
    }

    pub fn resource_ids(&self) -> impl Iterator<Item = ResourceId> {
        (0..self.resources.len()).map(ResourceId)
    }

    pub fn operation_ids(&self) -> impl Iterator<Item = OperationId> {
        (0..self.operations.len()).map(OperationId)
    }

    pub fn category_ids(&self) -> impl Iterator<Item = CategoryId> {
        (0..self.categories.len()).map(CategoryId)
    }

    pub fn resource_capacity(&self, id: ResourceId) -> Option<u64> {
        self.resources.get(id.0).map(ScreeningResource::capacity)
    }

    pub fn operation_resources(&self, id: OperationId) -> &[ResourceId] {
        self.operations
            .get(id.0)
            .map(|op| op.resources.as_slice())
            .unwrap_or(&[])
    }

    pub fn operations_using(&self, resource: ResourceId) -> impl Iterator<Item = OperationId> + '_ {
        self.operations
            .iter()
            .enumerate()
            .filter(move |(_, op)| op.resources.contains(&resource))
            .map(|(idx, _)| OperationId(idx))
    }

    pub fn time_windows(&self) -> impl Iterator<Item = TimeWindow> + '_ {
        self.schedule.keys().copied()
    }

    pub fn has_window(&self, window: TimeWindow) -> bool {
        self.schedule.contains_key(&window)
    }

    pub fn flights_in(&self, window: TimeWindow) -> impl Iterator<Item = FlightId> + '_ {
        self.schedule
            .get(&window)
            .into_iter()
            .flat_map(|flights| flights.keys().copied())
    }

    pub fn passengers(&self, window: TimeWindow, group: GroupKey) -> Option<u32> {
        let flights = self.schedule.get(&window)?;
        let categories = flights.get(&group.flight)?;
        if group.category.0 >= self.categories.len() {
            return None;
        }
        Some(categories.get(&group.category).copied().unwrap_or(0))
    }

    /// Every (flight scheduled in `window`, category) pair, in id order.
    pub fn groups(&self, window: TimeWindow) -> Vec<GroupKey> {
        let mut groups = Vec::new();
        for flight in self.flights_in(window) {
            for category in self.category_ids() {
                groups.push(GroupKey::new(flight, category));
            }
        }
        groups
    }
}
