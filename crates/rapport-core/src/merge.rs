//! The contact merger: folds an incoming [`SharePayload`] into the local
//! contact collection without ever duplicating a contact or a fact.
//!
//! The collection lives behind a [`ContactRepository`], read whole and written
//! whole. The repository does no locking of its own, so callers must not run
//! two merges against the same repository at once.

use std::{
  convert::Infallible,
  sync::{Mutex, PoisonError},
};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  Error, Result,
  contact::Contact,
  payload::SharePayload,
  profile::{Owner, ShareGroup},
};

// ─── Repository ──────────────────────────────────────────────────────────────

/// Load/save contract for the local contact collection.
pub trait ContactRepository: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn load(&self) -> Result<Vec<Contact>, Self::Error>;

  fn save(&self, contacts: &[Contact]) -> Result<(), Self::Error>;
}

/// A repository that lives and dies with the process.
#[derive(Debug, Default)]
pub struct MemoryRepository {
  contacts: Mutex<Vec<Contact>>,
}

impl MemoryRepository {
  pub fn new(contacts: Vec<Contact>) -> Self { Self { contacts: Mutex::new(contacts) } }
}

impl ContactRepository for MemoryRepository {
  type Error = Infallible;

  fn load(&self) -> Result<Vec<Contact>, Infallible> {
    Ok(self.contacts.lock().unwrap_or_else(PoisonError::into_inner).clone())
  }

  fn save(&self, contacts: &[Contact]) -> Result<(), Infallible> {
    *self.contacts.lock().unwrap_or_else(PoisonError::into_inner) = contacts.to_vec();
    Ok(())
  }
}

// ─── Outcome ─────────────────────────────────────────────────────────────────

/// What a merge did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
  /// The contact after the merge.
  pub contact:     Contact,
  pub was_created: bool,
  /// Facts actually added; duplicates by id are not counted.
  pub added_facts: usize,
  /// Whether anything in the collection changed (and was saved).
  pub changed:     bool,
}

// ─── Algorithm ───────────────────────────────────────────────────────────────

/// Merge `payload` into `contacts` in place.
///
/// - The contact whose `remote_id` equals `payload.owner.id` is found, or
///   created from the owner snapshot.
/// - Groups are matched by id; missing groups are created. Name and colour
///   follow the sender (latest wins).
/// - A fact is added only if its id is not already in the local group.
///   Local facts and notes are never removed or rewritten.
/// - Name is always refreshed from the owner snapshot; avatar and channels
///   are refreshed when the snapshot carries them.
pub fn merge_into(
  contacts: &mut Vec<Contact>,
  payload: &SharePayload,
  now: DateTime<Utc>,
) -> Result<MergeOutcome> {
  let remote_id = payload.require_identity()?;

  let existing = contacts
    .iter()
    .position(|c| c.remote_id.as_deref() == Some(remote_id));

  let (index, was_created) = match existing {
    Some(index) => (index, false),
    None => {
      contacts.push(seed_contact(remote_id, &payload.owner, now));
      (contacts.len() - 1, true)
    }
  };

  let contact = &mut contacts[index];
  let mut changed = was_created | refresh_owner(contact, &payload.owner);
  let mut added_facts = 0;

  for incoming in &payload.groups {
    let (local, group_changed) = local_group(contact, incoming);
    changed |= group_changed;

    for fact in &incoming.facts {
      if !local.contains_fact(&fact.id) {
        local.facts.push(fact.clone());
        added_facts += 1;
      }
    }
  }

  changed |= added_facts > 0;
  if changed && !was_created {
    contact.updated_at = now;
  }

  Ok(MergeOutcome {
    contact: contact.clone(),
    was_created,
    added_facts,
    changed,
  })
}

fn seed_contact(remote_id: &str, owner: &Owner, now: DateTime<Utc>) -> Contact {
  Contact {
    id:         Uuid::new_v4(),
    remote_id:  Some(remote_id.to_owned()),
    name:       owner.name.clone(),
    avatar:     owner.avatar.clone(),
    phone:      owner.phone.clone(),
    telegram:   owner.telegram.clone(),
    instagram:  owner.instagram.clone(),
    groups:     Vec::new(),
    notes:      Vec::new(),
    created_at: now,
    updated_at: now,
  }
}

/// Latest-wins refresh of the owner snapshot. Returns whether anything moved.
fn refresh_owner(contact: &mut Contact, owner: &Owner) -> bool {
  let mut changed = false;

  if contact.name != owner.name {
    contact.name = owner.name.clone();
    changed = true;
  }

  for (local, incoming) in [
    (&mut contact.avatar, &owner.avatar),
    (&mut contact.phone, &owner.phone),
    (&mut contact.telegram, &owner.telegram),
    (&mut contact.instagram, &owner.instagram),
  ] {
    if incoming.is_some() && *local != *incoming {
      *local = incoming.clone();
      changed = true;
    }
  }

  changed
}

/// Find or create the local copy of `incoming`, keeping name and colour in
/// step with the sender.
fn local_group<'c>(contact: &'c mut Contact, incoming: &ShareGroup) -> (&'c mut ShareGroup, bool) {
  match contact.groups.iter().position(|g| g.id == incoming.id) {
    Some(index) => {
      let local = &mut contact.groups[index];
      let mut changed = false;
      if local.name != incoming.name {
        local.name.clone_from(&incoming.name);
        changed = true;
      }
      if local.color != incoming.color {
        local.color.clone_from(&incoming.color);
        changed = true;
      }
      (local, changed)
    }
    None => {
      contact.groups.push(ShareGroup::new(
        incoming.id.clone(),
        incoming.name.clone(),
        incoming.color.clone(),
      ));
      let index = contact.groups.len() - 1;
      (&mut contact.groups[index], true)
    }
  }
}

// ─── Merger ──────────────────────────────────────────────────────────────────

/// Runs [`merge_into`] against a repository: load everything, merge, and save
/// everything back if something changed.
#[derive(Debug)]
pub struct ContactMerger<R> {
  repository: R,
}

impl<R: ContactRepository> ContactMerger<R> {
  pub fn new(repository: R) -> Self { Self { repository } }

  pub fn repository(&self) -> &R { &self.repository }

  /// Merge `payload`. A payload without an owner id is rejected before the
  /// repository is read.
  pub fn merge(&self, payload: &SharePayload) -> Result<MergeOutcome> {
    payload.require_identity()?;

    let mut contacts = self
      .repository
      .load()
      .map_err(|e| Error::Repository(Box::new(e)))?;

    let outcome = merge_into(&mut contacts, payload, Utc::now())?;

    if outcome.changed {
      self
        .repository
        .save(&contacts)
        .map_err(|e| Error::Repository(Box::new(e)))?;
    }

    Ok(outcome)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use chrono::TimeZone;

  use super::*;
  use crate::{
    privacy::PrivacyLevel,
    profile::{Fact, ShareGroup},
    token,
  };

  fn at(ms: i64) -> DateTime<Utc> { Utc.timestamp_millis_opt(ms).unwrap() }

  fn dana() -> Owner { Owner::new("u1", "Dana") }

  fn work(facts: &[(&str, &str)]) -> ShareGroup {
    facts.iter().fold(ShareGroup::new("g1", "Work", "#4f46e5"), |g, (id, text)| {
      g.with_fact(Fact::new(*id, *text))
    })
  }

  fn scenario_a() -> SharePayload {
    SharePayload::build(
      dana(),
      vec![work(&[("f1", "Backend engineer")])],
      PrivacyLevel::Public,
      at(1_700_000_000_000),
    )
  }

  fn merger() -> ContactMerger<MemoryRepository> { ContactMerger::new(MemoryRepository::default()) }

  #[test]
  fn first_merge_creates_the_contact() {
    let m = merger();
    let outcome = m.merge(&scenario_a()).unwrap();

    assert!(outcome.was_created);
    assert_eq!(outcome.added_facts, 1);
    assert_eq!(outcome.contact.remote_id.as_deref(), Some("u1"));
    assert_eq!(outcome.contact.name, "Dana");
    assert_eq!(outcome.contact.group("g1").unwrap().facts.len(), 1);
    assert_eq!(m.repository().load().unwrap().len(), 1);
  }

  #[test]
  fn repeated_merge_is_a_no_op() {
    let m = merger();
    m.merge(&scenario_a()).unwrap();
    let before = m.repository().load().unwrap();

    let outcome = m.merge(&scenario_a()).unwrap();
    assert!(!outcome.was_created);
    assert_eq!(outcome.added_facts, 0);
    assert!(!outcome.changed);
    assert_eq!(m.repository().load().unwrap(), before);
  }

  #[test]
  fn new_fact_is_added_and_local_data_survives() {
    let m = merger();
    m.merge(&scenario_a()).unwrap();

    // The user annotates the contact between exchanges.
    let mut contacts = m.repository().load().unwrap();
    contacts[0].notes.push("Met at RustConf".into());
    m.repository().save(&contacts).unwrap();

    let second = SharePayload::build(
      dana(),
      vec![work(&[("f1", "Backend engineer"), ("f2", "Loves chess")])],
      PrivacyLevel::Public,
      at(1_700_000_100_000),
    );
    let outcome = m.merge(&second).unwrap();

    assert!(!outcome.was_created);
    assert_eq!(outcome.added_facts, 1);
    let group = outcome.contact.group("g1").unwrap();
    assert_eq!(group.facts, vec![
      Fact::new("f1", "Backend engineer"),
      Fact::new("f2", "Loves chess"),
    ]);
    assert_eq!(outcome.contact.notes, vec!["Met at RustConf".to_string()]);
  }

  #[test]
  fn incoming_fact_never_overwrites_a_local_fact_with_the_same_id() {
    let m = merger();
    m.merge(&scenario_a()).unwrap();

    let edited = SharePayload::build(
      dana(),
      vec![work(&[("f1", "Staff engineer")])],
      PrivacyLevel::Public,
      at(1_700_000_200_000),
    );
    let outcome = m.merge(&edited).unwrap();
    assert_eq!(outcome.added_facts, 0);
    assert_eq!(outcome.contact.group("g1").unwrap().facts[0].text, "Backend engineer");
  }

  #[test]
  fn merging_the_same_payload_twice_is_idempotent_for_many_shapes() {
    let payloads = [
      scenario_a(),
      SharePayload::build(dana(), vec![], PrivacyLevel::Public, at(0)),
      SharePayload::build(
        Owner { phone: Some("+1".into()), ..dana() },
        vec![
          work(&[("f1", "a"), ("f2", "b")]),
          ShareGroup::new("g2", "Fun", "#0f0").with_fact(Fact::new("f1", "c")),
          ShareGroup::new("g3", "Empty", "#00f"),
        ],
        PrivacyLevel::SecondDegree,
        at(1),
      ),
    ];

    for payload in payloads {
      let mut contacts = vec![Contact::manual("Someone else")];
      merge_into(&mut contacts, &payload, at(10)).unwrap();
      let snapshot = contacts.clone();

      let again = merge_into(&mut contacts, &payload, at(20)).unwrap();
      assert!(!again.was_created);
      assert_eq!(again.added_facts, 0);
      assert_eq!(contacts, snapshot);
    }
  }

  #[test]
  fn duplicate_fact_ids_in_one_payload_are_added_once() {
    let payload = SharePayload::build(
      dana(),
      vec![work(&[("f1", "one"), ("f1", "one again")])],
      PrivacyLevel::Public,
      at(0),
    );
    let mut contacts = Vec::new();
    let outcome = merge_into(&mut contacts, &payload, at(0)).unwrap();
    assert_eq!(outcome.added_facts, 1);
    assert_eq!(contacts[0].fact_count(), 1);
  }

  #[test]
  fn owner_channels_refresh_latest_wins() {
    let mut contacts = Vec::new();
    let first = SharePayload::build(
      Owner { phone: Some("+1 111".into()), telegram: Some("@old".into()), ..dana() },
      vec![],
      PrivacyLevel::Public,
      at(0),
    );
    merge_into(&mut contacts, &first, at(0)).unwrap();

    let second = SharePayload::build(
      Owner {
        name: "Dana K.".into(),
        telegram: Some("@new".into()),
        ..dana()
      },
      vec![],
      PrivacyLevel::Public,
      at(1),
    );
    let outcome = merge_into(&mut contacts, &second, at(5)).unwrap();

    assert!(outcome.changed);
    assert_eq!(outcome.contact.name, "Dana K.");
    assert_eq!(outcome.contact.telegram.as_deref(), Some("@new"));
    // Absent in the snapshot, so the known number is kept.
    assert_eq!(outcome.contact.phone.as_deref(), Some("+1 111"));
    assert_eq!(outcome.contact.updated_at, at(5));
  }

  #[test]
  fn direct_only_share_merges_without_channels() {
    let payload = SharePayload::build(
      Owner { phone: Some("+15550100".into()), ..dana() },
      vec![work(&[("f1", "Backend engineer")])],
      PrivacyLevel::DirectOnly,
      at(0),
    );
    let decoded = token::decode(&token::encode(&payload).unwrap()).unwrap();

    let mut contacts = Vec::new();
    let outcome = merge_into(&mut contacts, &decoded, at(0)).unwrap();
    assert!(outcome.was_created);
    assert_eq!(outcome.contact.phone, None);
  }

  #[test]
  fn renamed_group_keeps_its_facts() {
    let mut contacts = Vec::new();
    merge_into(&mut contacts, &scenario_a(), at(0)).unwrap();

    let renamed = SharePayload::build(
      dana(),
      vec![ShareGroup::new("g1", "Day job", "#dc2626")],
      PrivacyLevel::Public,
      at(1),
    );
    let outcome = merge_into(&mut contacts, &renamed, at(1)).unwrap();
    let group = outcome.contact.group("g1").unwrap();
    assert_eq!(group.name, "Day job");
    assert_eq!(group.color, "#dc2626");
    assert_eq!(group.facts.len(), 1);
    assert_eq!(outcome.contact.groups.len(), 1);
  }

  #[test]
  fn manual_contacts_are_never_matched() {
    let mut manual = Contact::manual("Dana");
    manual.notes.push("typed in by hand".into());
    let mut contacts = vec![manual.clone()];

    let outcome = merge_into(&mut contacts, &scenario_a(), at(0)).unwrap();
    assert!(outcome.was_created);
    assert_eq!(contacts.len(), 2);
    assert_eq!(contacts[0], manual);
  }

  #[test]
  fn distinct_owners_get_distinct_contacts() {
    let mut contacts = Vec::new();
    merge_into(&mut contacts, &scenario_a(), at(0)).unwrap();
    let other = SharePayload::build(
      Owner::new("u2", "Eli"),
      vec![work(&[("f1", "Designer")])],
      PrivacyLevel::Public,
      at(0),
    );
    let outcome = merge_into(&mut contacts, &other, at(0)).unwrap();
    assert!(outcome.was_created);
    assert_eq!(contacts.len(), 2);
  }

  struct CountingRepository {
    loads: AtomicUsize,
    saves: AtomicUsize,
    inner: MemoryRepository,
  }

  impl ContactRepository for CountingRepository {
    type Error = Infallible;

    fn load(&self) -> Result<Vec<Contact>, Infallible> {
      self.loads.fetch_add(1, Ordering::SeqCst);
      self.inner.load()
    }

    fn save(&self, contacts: &[Contact]) -> Result<(), Infallible> {
      self.saves.fetch_add(1, Ordering::SeqCst);
      self.inner.save(contacts)
    }
  }

  #[test]
  fn identity_less_payload_is_rejected_before_loading() {
    let m = ContactMerger::new(CountingRepository {
      loads: AtomicUsize::new(0),
      saves: AtomicUsize::new(0),
      inner: MemoryRepository::default(),
    });
    let payload = SharePayload::build(Owner::new("", "Ghost"), vec![], PrivacyLevel::Public, at(0));

    assert!(matches!(m.merge(&payload), Err(Error::MissingIdentity)));
    assert_eq!(m.repository().loads.load(Ordering::SeqCst), 0);
    assert_eq!(m.repository().saves.load(Ordering::SeqCst), 0);
  }

  #[test]
  fn unchanged_merge_does_not_save() {
    let m = ContactMerger::new(CountingRepository {
      loads: AtomicUsize::new(0),
      saves: AtomicUsize::new(0),
      inner: MemoryRepository::default(),
    });
    m.merge(&scenario_a()).unwrap();
    m.merge(&scenario_a()).unwrap();
    assert_eq!(m.repository().loads.load(Ordering::SeqCst), 2);
    assert_eq!(m.repository().saves.load(Ordering::SeqCst), 1);
  }
}
