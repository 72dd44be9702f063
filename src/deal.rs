//! The accepted commercial draft (BDO) a staging snapshot is locked from
use crate::error::ValidationError;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    #[n(0)]
    Inbound,
    #[n(1)]
    Outbound,
    #[n(2)]
    Internal,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Party {
    #[n(0)]
    pub id: String, // bech32 encoded uuid7
    #[n(1)]
    pub name: String,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct LineItem {
    #[n(0)]
    pub sku: String,
    #[n(1)]
    pub title: String,
    #[n(2)]
    pub qty: f64,
    #[n(3)]
    pub unit_price: f64, // minor currency units
    #[n(4)]
    pub uom: String,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Geography {
    #[n(0)]
    pub origin: String,
    #[n(1)]
    pub destination: String,
}

// Also used while negotiating; the content hash is taken over the CBOR encoding
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct DealDraft {
    #[n(0)]
    source_id: Option<String>,
    #[n(1)]
    direction: Direction,
    #[n(2)]
    counterparty: Option<Party>,
    #[n(3)]
    our_party: Option<Party>,
    #[n(4)]
    lines: Vec<LineItem>,
    #[n(5)]
    schedule: Option<String>,
    #[n(6)]
    transport: Option<String>,
    #[n(7)]
    geography: Option<Geography>,
    #[n(8)]
    notes: Option<String>,
}

impl LineItem {
    pub fn new(sku: &str, title: &str, qty: f64, unit_price: f64, uom: &str) -> Self {
        Self {
            sku: sku.into(),
            title: title.into(),
            qty,
            unit_price,
            uom: uom.into(),
        }
    }

    /// Line total in minor units, rounded half away from zero. `None` when it does not fit an i64.
    pub fn rounded_total(&self) -> Option<i64> {
        let total = (self.unit_price * self.qty).round();
        // i64::MAX as f64 is 2^63, one past the largest i64
        (total.is_finite() && total >= i64::MIN as f64 && total < i64::MAX as f64).then_some(total as i64)
    }
}

impl Party {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl DealDraft {
    pub fn new(direction: Direction) -> Self {
        Self {
            source_id: None,
            direction,
            counterparty: None,
            our_party: None,
            lines: vec![],
            schedule: None,
            transport: None,
            geography: None,
            notes: None,
        }
    }
    pub fn set_source_id(mut self, id: &str) -> Self {
        self.source_id = Some(id.into());
        self
    }
    pub fn set_counterparty(mut self, party: Party) -> Self {
        self.counterparty = Some(party);
        self
    }
    pub fn set_our_party(mut self, party: Party) -> Self {
        self.our_party = Some(party);
        self
    }
    pub fn add_line(mut self, line: LineItem) -> Self {
        self.lines.push(line);
        self
    }
    pub fn set_schedule(mut self, schedule: &str) -> Self {
        self.schedule = Some(schedule.into());
        self
    }
    pub fn set_transport(mut self, transport: &str) -> Self {
        self.transport = Some(transport.into());
        self
    }
    pub fn set_geography(mut self, origin: &str, destination: &str) -> Self {
        self.geography = Some(Geography {
            origin: origin.into(),
            destination: destination.into(),
        });
        self
    }
    pub fn set_notes(mut self, notes: &str) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn source_id(&self) -> Option<&str> {
        self.source_id.as_deref()
    }
    pub fn direction(&self) -> Direction {
        self.direction
    }
    pub fn counterparty(&self) -> Option<&Party> {
        self.counterparty.as_ref()
    }
    pub fn our_party(&self) -> Option<&Party> {
        self.our_party.as_ref()
    }
    pub fn lines(&self) -> &[LineItem] {
        &self.lines
    }
    pub fn schedule(&self) -> Option<&str> {
        self.schedule.as_deref()
    }
    pub fn transport(&self) -> Option<&str> {
        self.transport.as_deref()
    }
    pub fn geography(&self) -> Option<&Geography> {
        self.geography.as_ref()
    }
    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    /// Checks the fields a staging snapshot cannot be locked without.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.source_id.as_deref().is_none_or(str::is_empty) {
            return Err(ValidationError::MissingSourceId);
        }
        if self.lines.is_empty() {
            return Err(ValidationError::NoLineItems);
        }
        for line in &self.lines {
            let ok = line.qty.is_finite()
                && line.unit_price.is_finite()
                && line.qty >= 0.0
                && line.unit_price >= 0.0;
            if !ok {
                return Err(ValidationError::InvalidLineItem(line.sku.clone()));
            }
            if line.rounded_total().is_none() {
                return Err(ValidationError::TotalOverflow(line.sku.clone()));
            }
        }
        Ok(())
    }

    // returns the sha256 of the draft serialised into cbor, alongside the encoding
    pub fn finalise(&self) -> anyhow::Result<(String, Vec<u8>)> {
        let contents = minicbor::to_vec(self)?;
        let hash = sha256::digest(&contents);

        Ok((hash, contents))
    }

    pub fn content_hash(&self) -> anyhow::Result<String> {
        Ok(self.finalise()?.0)
    }
}
