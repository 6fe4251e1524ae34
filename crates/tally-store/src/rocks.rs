//! `RocksDB` storage implementation.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};

use tally_core::{
    Account, Conversation, ConversationId, LedgerEntry, Message, RefType, Transaction,
    TransactionId, UserId,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::Store;

/// RocksDB-backed storage implementation.
///
/// `RocksDB` gives atomic multi-CF batches but no compare-and-swap, so the
/// read-modify-write operations (balance deltas, conversation counters, the
/// ledger uniqueness check) are serialized through an internal mutex. Plain
/// point reads and writes go straight to the database.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    write_mu: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            write_mu: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Acquire the read-modify-write lock.
    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_mu
            .lock()
            .map_err(|_| StoreError::Database("write lock poisoned".into()))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Apply a balance delta under the write lock.
    ///
    /// When `floor_at_zero` is set the delta is rejected (without mutation)
    /// if it would take the balance negative. `bump_purchased` additionally
    /// adds the delta to `total_purchased`.
    fn apply_account_delta(
        &self,
        user_id: &UserId,
        delta: i64,
        floor_at_zero: bool,
        bump_purchased: bool,
    ) -> Result<i64> {
        let _guard = self.lock()?;

        let mut account = self.get_account(user_id)?.ok_or(StoreError::NotFound)?;

        if floor_at_zero && account.credits + delta < 0 {
            return Err(StoreError::InsufficientCredits {
                balance: account.credits,
                required: -delta,
            });
        }

        account.credits += delta;
        if bump_purchased {
            account.total_purchased += delta;
        }
        account.updated_at = chrono::Utc::now();

        let cf = self.cf(cf::ACCOUNTS)?;
        let value = Self::serialize(&account)?;
        self.db
            .put_cf(&cf, keys::account_key(user_id), value)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(account.credits)
    }

    /// Collect an owner's index keys under `prefix`, newest first.
    fn scan_index_desc(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        let cf = self.cf(cf_name)?;
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, rocksdb::Direction::Forward));

        let mut all_keys: Vec<Vec<u8>> = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            all_keys.push(key.to_vec());
        }

        // ULID suffixes are time-ordered, so reversing gives newest first.
        all_keys.reverse();
        Ok(all_keys)
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Account Operations
    // =========================================================================

    fn put_account(&self, account: &Account) -> Result<()> {
        let cf = self.cf(cf::ACCOUNTS)?;
        let key = keys::account_key(&account.user_id);
        let value = Self::serialize(account)?;

        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn get_account(&self, user_id: &UserId) -> Result<Option<Account>> {
        let cf = self.cf(cf::ACCOUNTS)?;
        let key = keys::account_key(user_id);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn debit_credits(&self, user_id: &UserId, amount: i64) -> Result<i64> {
        self.apply_account_delta(user_id, -amount.abs(), true, false)
    }

    fn refund_credits(&self, user_id: &UserId, amount: i64) -> Result<i64> {
        self.apply_account_delta(user_id, amount.abs(), false, false)
    }

    fn credit_purchase(&self, user_id: &UserId, amount: i64) -> Result<i64> {
        self.apply_account_delta(user_id, amount.abs(), false, true)
    }

    // =========================================================================
    // Transaction Operations
    // =========================================================================

    fn put_transaction(&self, transaction: &Transaction) -> Result<()> {
        let cf_txn = self.cf(cf::TRANSACTIONS)?;
        let cf_by_user = self.cf(cf::TRANSACTIONS_BY_USER)?;

        let txn_key = keys::transaction_key(&transaction.id);
        let user_txn_key = keys::user_transaction_key(&transaction.user_id, &transaction.id);
        let value = Self::serialize(transaction)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_txn, &txn_key, &value);
        batch.put_cf(&cf_by_user, &user_txn_key, []); // Index entry (empty value)

        // Session and intent IDs are immutable once set, so (re)writing the
        // index entries on every update is harmless.
        if let Some(session_id) = &transaction.session_id {
            let cf_by_session = self.cf(cf::TRANSACTIONS_BY_SESSION)?;
            batch.put_cf(&cf_by_session, keys::session_key(session_id), &txn_key);
        }
        if let Some(intent_id) = &transaction.payment_intent_id {
            let cf_by_intent = self.cf(cf::TRANSACTIONS_BY_INTENT)?;
            batch.put_cf(&cf_by_intent, keys::intent_key(intent_id), &txn_key);
        }

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<Transaction>> {
        let cf = self.cf(cf::TRANSACTIONS)?;
        let key = keys::transaction_key(transaction_id);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn find_transaction_by_session(&self, session_id: &str) -> Result<Option<Transaction>> {
        let cf = self.cf(cf::TRANSACTIONS_BY_SESSION)?;

        let Some(txn_key) = self
            .db
            .get_cf(&cf, keys::session_key(session_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(None);
        };

        let mut bytes = [0u8; 16];
        if txn_key.len() != 16 {
            return Err(StoreError::Database("malformed session index entry".into()));
        }
        bytes.copy_from_slice(&txn_key);
        let txn_id =
            TransactionId::from_bytes(bytes).map_err(|e| StoreError::Database(e.to_string()))?;

        self.get_transaction(&txn_id)
    }

    fn find_transaction_by_intent(&self, payment_intent_id: &str) -> Result<Option<Transaction>> {
        let cf = self.cf(cf::TRANSACTIONS_BY_INTENT)?;

        let Some(txn_key) = self
            .db
            .get_cf(&cf, keys::intent_key(payment_intent_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(None);
        };

        let mut bytes = [0u8; 16];
        if txn_key.len() != 16 {
            return Err(StoreError::Database("malformed intent index entry".into()));
        }
        bytes.copy_from_slice(&txn_key);
        let txn_id =
            TransactionId::from_bytes(bytes).map_err(|e| StoreError::Database(e.to_string()))?;

        self.get_transaction(&txn_id)
    }

    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>> {
        let all_keys =
            self.scan_index_desc(cf::TRANSACTIONS_BY_USER, &keys::user_prefix(user_id))?;

        let mut transactions = Vec::new();
        for key in all_keys.into_iter().skip(offset) {
            if transactions.len() >= limit {
                break;
            }
            let txn_id = keys::extract_transaction_id(&key);
            if let Some(txn) = self.get_transaction(&txn_id)? {
                transactions.push(txn);
            }
        }

        Ok(transactions)
    }

    // =========================================================================
    // Ledger Operations
    // =========================================================================

    fn insert_ledger_entry(&self, entry: &LedgerEntry) -> Result<()> {
        let _guard = self.lock()?;

        let cf_by_ref = self.cf(cf::LEDGER_BY_REF)?;
        let ref_key = keys::ledger_ref_key(entry.reference.ref_type, &entry.reference.ref_id);

        let existing = self
            .db
            .get_cf(&cf_by_ref, &ref_key)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        if existing.is_some() {
            tracing::debug!(
                ref_type = %entry.reference.ref_type.as_str(),
                ref_id = %entry.reference.ref_id,
                "Ledger insert rejected by uniqueness guard"
            );
            return Err(StoreError::DuplicateLedgerEntry {
                ref_type: entry.reference.ref_type.as_str().to_string(),
                ref_id: entry.reference.ref_id.clone(),
            });
        }

        let cf_ledger = self.cf(cf::LEDGER)?;
        let cf_by_user = self.cf(cf::LEDGER_BY_USER)?;

        let entry_key = keys::ledger_key(&entry.id);
        let user_key = keys::user_ledger_key(&entry.user_id, &entry.id);
        let value = Self::serialize(entry)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_ledger, &entry_key, &value);
        batch.put_cf(&cf_by_ref, &ref_key, &entry_key);
        batch.put_cf(&cf_by_user, &user_key, []);

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn get_ledger_entry_by_ref(
        &self,
        ref_type: RefType,
        ref_id: &str,
    ) -> Result<Option<LedgerEntry>> {
        let cf_by_ref = self.cf(cf::LEDGER_BY_REF)?;

        let Some(entry_key) = self
            .db
            .get_cf(&cf_by_ref, keys::ledger_ref_key(ref_type, ref_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(None);
        };

        let cf_ledger = self.cf(cf::LEDGER)?;
        self.db
            .get_cf(&cf_ledger, entry_key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn list_ledger_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>> {
        let all_keys = self.scan_index_desc(cf::LEDGER_BY_USER, &keys::user_prefix(user_id))?;
        let cf_ledger = self.cf(cf::LEDGER)?;

        let mut entries = Vec::new();
        for key in all_keys.into_iter().skip(offset) {
            if entries.len() >= limit {
                break;
            }
            let entry_id = keys::extract_ledger_entry_id(&key);
            if let Some(data) = self
                .db
                .get_cf(&cf_ledger, keys::ledger_key(&entry_id))
                .map_err(|e| StoreError::Database(e.to_string()))?
            {
                entries.push(Self::deserialize(&data)?);
            }
        }

        Ok(entries)
    }

    // =========================================================================
    // Chat Operations
    // =========================================================================

    fn put_conversation(&self, conversation: &Conversation) -> Result<()> {
        let cf_conv = self.cf(cf::CONVERSATIONS)?;
        let cf_by_user = self.cf(cf::CONVERSATIONS_BY_USER)?;

        let conv_key = keys::conversation_key(&conversation.id);
        let user_key = keys::user_conversation_key(&conversation.user_id, &conversation.id);
        let value = Self::serialize(conversation)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_conv, &conv_key, &value);
        batch.put_cf(&cf_by_user, &user_key, []);

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn get_conversation(&self, conversation_id: &ConversationId) -> Result<Option<Conversation>> {
        let cf = self.cf(cf::CONVERSATIONS)?;
        let key = keys::conversation_key(conversation_id);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn list_conversations_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<Conversation>> {
        let all_keys =
            self.scan_index_desc(cf::CONVERSATIONS_BY_USER, &keys::user_prefix(user_id))?;

        let mut conversations = Vec::new();
        for key in all_keys {
            let conv_id = keys::extract_conversation_id(&key);
            if let Some(conv) = self.get_conversation(&conv_id)? {
                if conv.is_active {
                    conversations.push(conv);
                }
            }
        }

        // Most recently updated first, not creation order.
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        conversations.truncate(limit);

        Ok(conversations)
    }

    fn append_message(&self, message: &Message) -> Result<()> {
        let _guard = self.lock()?;

        let mut conversation = self
            .get_conversation(&message.conversation_id)?
            .ok_or(StoreError::NotFound)?;
        conversation.note_message(message.tokens.unwrap_or(0));

        let cf_messages = self.cf(cf::MESSAGES)?;
        let cf_conv = self.cf(cf::CONVERSATIONS)?;

        let msg_key = keys::message_key(&message.conversation_id, &message.id);
        let conv_key = keys::conversation_key(&conversation.id);

        let msg_value = Self::serialize(message)?;
        let conv_value = Self::serialize(&conversation)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_messages, &msg_key, &msg_value);
        batch.put_cf(&cf_conv, &conv_key, &conv_value);

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn list_messages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Message>> {
        let cf = self.cf(cf::MESSAGES)?;
        let prefix = keys::conversation_messages_prefix(conversation_id);

        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, rocksdb::Direction::Forward));

        let mut messages = Vec::new();
        let mut skipped = 0;

        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            if skipped < offset {
                skipped += 1;
                continue;
            }
            if messages.len() >= limit {
                break;
            }
            messages.push(Self::deserialize(&value)?);
        }

        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::{LedgerReason, Message, PlanCatalog};
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn seeded_account(store: &RocksStore, credits: i64) -> UserId {
        let user_id = UserId::generate();
        let mut account = Account::new(user_id, "test@example.com");
        account.credits = credits;
        store.put_account(&account).unwrap();
        user_id
    }

    #[test]
    fn account_crud_and_deltas() {
        let (store, _dir) = create_test_store();
        let user_id = seeded_account(&store, 10);

        let balance = store.debit_credits(&user_id, 1).unwrap();
        assert_eq!(balance, 9);

        let balance = store.refund_credits(&user_id, 1).unwrap();
        assert_eq!(balance, 10);

        let balance = store.credit_purchase(&user_id, 500).unwrap();
        assert_eq!(balance, 510);

        let account = store.get_account(&user_id).unwrap().unwrap();
        assert_eq!(account.credits, 510);
        assert_eq!(account.total_purchased, 500);
    }

    #[test]
    fn debit_fails_without_mutation_when_broke() {
        let (store, _dir) = create_test_store();
        let user_id = seeded_account(&store, 0);

        let result = store.debit_credits(&user_id, 1);
        assert!(matches!(
            result,
            Err(StoreError::InsufficientCredits {
                balance: 0,
                required: 1
            })
        ));

        let account = store.get_account(&user_id).unwrap().unwrap();
        assert_eq!(account.credits, 0);
    }

    #[test]
    fn concurrent_debits_never_go_negative() {
        let (store, _dir) = create_test_store();
        let store = Arc::new(store);
        let user_id = seeded_account(&store, 10);

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.debit_credits(&user_id, 1).is_ok())
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(successes, 10);
        let account = store.get_account(&user_id).unwrap().unwrap();
        assert_eq!(account.credits, 0);
    }

    #[test]
    fn transaction_indexes() {
        let (store, _dir) = create_test_store();
        let user_id = seeded_account(&store, 0);
        let catalog = PlanCatalog::default();

        let mut txn = Transaction::for_plan(user_id, catalog.get("starter").unwrap());
        txn.bind_session("cs_test_abc").unwrap();
        store.put_transaction(&txn).unwrap();

        let by_session = store
            .find_transaction_by_session("cs_test_abc")
            .unwrap()
            .unwrap();
        assert_eq!(by_session.id, txn.id);
        assert!(store.find_transaction_by_session("cs_other").unwrap().is_none());

        txn.mark_paid(Some("pi_test_abc".into())).unwrap();
        store.put_transaction(&txn).unwrap();

        let by_intent = store
            .find_transaction_by_intent("pi_test_abc")
            .unwrap()
            .unwrap();
        assert_eq!(by_intent.id, txn.id);
    }

    #[test]
    fn list_transactions_newest_first_with_pagination() {
        let (store, _dir) = create_test_store();
        let user_id = seeded_account(&store, 0);
        let catalog = PlanCatalog::default();

        let first = Transaction::for_plan(user_id, catalog.get("starter").unwrap());
        store.put_transaction(&first).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(2)); // Ensure different ULIDs

        let second = Transaction::for_plan(user_id, catalog.get("pro").unwrap());
        store.put_transaction(&second).unwrap();

        let all = store.list_transactions_by_user(&user_id, 10, 0).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, second.id);
        assert_eq!(all[1].id, first.id);

        let page2 = store.list_transactions_by_user(&user_id, 1, 1).unwrap();
        assert_eq!(page2.len(), 1);
        assert_eq!(page2[0].id, first.id);
    }

    #[test]
    fn ledger_uniqueness_guard() {
        let (store, _dir) = create_test_store();
        let user_id = seeded_account(&store, 0);
        let txn_id = TransactionId::generate();

        let entry = LedgerEntry::purchase(user_id, 500, txn_id);
        store.insert_ledger_entry(&entry).unwrap();

        // A second entry for the same transaction must be rejected even
        // though its own entry ID differs.
        let duplicate = LedgerEntry::purchase(user_id, 500, txn_id);
        let result = store.insert_ledger_entry(&duplicate);
        assert!(matches!(result, Err(StoreError::DuplicateLedgerEntry { .. })));

        let entries = store.list_ledger_by_user(&user_id, 10, 0).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, entry.id);

        let by_ref = store
            .get_ledger_entry_by_ref(RefType::Transaction, &txn_id.to_string())
            .unwrap()
            .unwrap();
        assert_eq!(by_ref.id, entry.id);
        assert_eq!(by_ref.reason, LedgerReason::Purchase);
    }

    #[test]
    fn concurrent_ledger_inserts_allow_exactly_one() {
        let (store, _dir) = create_test_store();
        let store = Arc::new(store);
        let user_id = seeded_account(&store, 0);
        let txn_id = TransactionId::generate();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let entry = LedgerEntry::purchase(user_id, 500, txn_id);
                    store.insert_ledger_entry(&entry).is_ok()
                })
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(successes, 1);
        assert_eq!(store.list_ledger_by_user(&user_id, 10, 0).unwrap().len(), 1);
    }

    #[test]
    fn conversation_and_message_flow() {
        let (store, _dir) = create_test_store();
        let user_id = seeded_account(&store, 10);

        let conv = Conversation::new(user_id, "First chat");
        store.put_conversation(&conv).unwrap();

        let m1 = Message::from_user(conv.id, user_id, "hello");
        store.append_message(&m1).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(2));

        let m2 = Message::from_assistant(conv.id, user_id, "hi!", 64);
        store.append_message(&m2).unwrap();

        let messages = store.list_messages(&conv.id, 10, 0).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, m1.id); // Oldest first
        assert_eq!(messages[1].id, m2.id);

        let conv = store.get_conversation(&conv.id).unwrap().unwrap();
        assert_eq!(conv.message_count, 2);
        assert_eq!(conv.total_tokens, 64);
        assert!(conv.last_message_at.is_some());
    }

    #[test]
    fn append_message_to_missing_conversation_fails() {
        let (store, _dir) = create_test_store();
        let user_id = seeded_account(&store, 10);

        let msg = Message::from_user(ConversationId::generate(), user_id, "hello");
        assert!(matches!(
            store.append_message(&msg),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn inactive_conversations_are_hidden() {
        let (store, _dir) = create_test_store();
        let user_id = seeded_account(&store, 10);

        let keep = Conversation::new(user_id, "keep");
        store.put_conversation(&keep).unwrap();

        let mut gone = Conversation::new(user_id, "gone");
        gone.is_active = false;
        store.put_conversation(&gone).unwrap();

        let listed = store.list_conversations_by_user(&user_id, 10).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, keep.id);
    }
}
