use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;
use vaamoose_core::payment::{IntentStatus, PaymentIntent};
use vaamoose_core::repository::IntentStore;
use vaamoose_core::{CoreError, CoreResult};

#[derive(Debug, Default)]
pub struct InMemoryIntentStore {
    intents: Mutex<HashMap<String, PaymentIntent>>,
}

impl InMemoryIntentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IntentStore for InMemoryIntentStore {
    async fn insert(&self, intent: &PaymentIntent) -> CoreResult<()> {
        let mut intents = self.intents.lock().unwrap_or_else(|e| e.into_inner());
        if intents.contains_key(&intent.reference) {
            return Err(CoreError::DuplicateReference(intent.reference.clone()));
        }
        intents.insert(intent.reference.clone(), intent.clone());
        Ok(())
    }

    async fn get(&self, reference: &str) -> CoreResult<Option<PaymentIntent>> {
        let intents = self.intents.lock().unwrap_or_else(|e| e.into_inner());
        Ok(intents.get(reference).cloned())
    }

    async fn find_open_for_session(&self, session_id: Uuid) -> CoreResult<Option<PaymentIntent>> {
        let intents = self.intents.lock().unwrap_or_else(|e| e.into_inner());
        Ok(intents
            .values()
            .filter(|i| i.session_id == session_id && i.is_open())
            .max_by_key(|i| i.created_at)
            .cloned())
    }

    async fn compare_and_set(&self, intent: &PaymentIntent, expected: IntentStatus) -> CoreResult<bool> {
        let mut intents = self.intents.lock().unwrap_or_else(|e| e.into_inner());
        match intents.get_mut(&intent.reference) {
            Some(stored) if stored.status == expected => {
                *stored = intent.clone();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(CoreError::NotFound(format!("payment intent {}", intent.reference))),
        }
    }
}
