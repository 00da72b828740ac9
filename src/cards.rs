use std::collections::HashMap;

/// Names the two card regions a task renders into: the card it shows while
/// the task is open, and the card revealed once the task is turned in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardGroupPair {
    pub active: String,
    pub completed: String,
}

impl CardGroupPair {
    pub fn new(active: impl Into<String>, completed: impl Into<String>) -> Self {
        Self {
            active: active.into(),
            completed: completed.into(),
        }
    }
}

/// View state of a single card region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardRegion {
    /// Whether the region itself is shown.
    pub visible: bool,
    /// Whether the region still holds its card. Submitting removes the
    /// active card for good.
    pub has_card: bool,
    /// Whether the card body is folded down to its header.
    pub collapsed: bool,
}

/// UI events the controller reacts to. Carrying the region name instead of a
/// live element keeps the controller independent of any document, and there
/// is no default action to suppress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardEvent {
    CollapseToggled { region: String },
    TaskSubmitted { region: String },
}

/// Tracks the display state of every card region in a set of pairs.
///
/// Each pair is registered independently, so the pair list can be any length
/// and its order never matters. Events naming a region that was never bound
/// are logged and ignored.
pub struct CardController {
    pairs: Vec<CardGroupPair>,
    regions: HashMap<String, CardRegion>,
}

impl CardController {
    pub fn bind(pairs: Vec<CardGroupPair>) -> Self {
        let mut regions = HashMap::new();
        for pair in &pairs {
            regions.insert(
                pair.active.clone(),
                CardRegion {
                    visible: true,
                    has_card: true,
                    collapsed: false,
                },
            );
            regions.insert(
                pair.completed.clone(),
                CardRegion {
                    visible: false,
                    has_card: true,
                    collapsed: false,
                },
            );
        }
        Self { pairs, regions }
    }

    pub fn handle(&mut self, event: CardEvent) {
        match event {
            CardEvent::CollapseToggled { region } => self.toggle_collapse(&region),
            CardEvent::TaskSubmitted { region } => self.submit_task(&region),
        }
    }

    /// Feed the controller from any event source, real or fake.
    pub fn drain<I>(&mut self, events: I)
    where
        I: IntoIterator<Item = CardEvent>,
    {
        for event in events {
            self.handle(event);
        }
    }

    fn toggle_collapse(&mut self, region: &str) {
        match self.regions.get_mut(region) {
            Some(state) if state.has_card => state.collapsed = !state.collapsed,
            Some(_) => tracing::warn!(region, "collapse toggle ignored, card was removed"),
            None => tracing::warn!(region, "collapse toggle on unbound region"),
        }
    }

    fn submit_task(&mut self, region: &str) {
        let Some(pair) = self
            .pairs
            .iter()
            .find(|pair| pair.active == region)
            .cloned()
        else {
            tracing::warn!(region, "task submit from unbound region");
            return;
        };

        if let Some(completed) = self.regions.get_mut(&pair.completed) {
            completed.visible = true;
        }
        if let Some(active) = self.regions.get_mut(&pair.active) {
            active.has_card = false;
        }
    }

    pub fn region(&self, name: &str) -> Option<CardRegion> {
        self.regions.get(name).copied()
    }

    pub fn pairs(&self) -> &[CardGroupPair] {
        &self.pairs
    }
}
