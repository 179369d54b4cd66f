use log::{trace, warn};
use rusqlite::OptionalExtension;

use crate::{
    feed::{Contact, ContactEmail, ContactId},
    replica::{Replica, StoreError},
};

/// Read-side ceiling for the opaque contact blob. Rows that outgrow it are
/// reported as absent so the next incoming payload overwrites them.
const MAX_CONTACT_BLOB: usize = 2 * 1024 * 1024;

impl Replica {
    pub async fn save_contact(&self, contact: &Contact) -> Result<(), StoreError> {
        trace!("saving contact {}", contact.id);
        let db = self.lock().await;
        let mut stmt = db.prepare_cached(
            "insert or replace into contacts (id, name, data) values (?1, ?2, ?3)",
        )?;
        stmt.execute((contact.id.as_str(), &contact.name, &contact.data))?;
        Ok(())
    }

    pub async fn find_contact(&self, id: &ContactId) -> Result<Option<Contact>, StoreError> {
        trace!("looking up contact {id}");
        let db = self.lock().await;
        let mut stmt = db.prepare_cached("select id, name, data from contacts where id = ?1")?;
        let contact = stmt
            .query_one([id.as_str()], |row| {
                Ok(Contact {
                    id: ContactId::from(row.get::<_, String>(0)?),
                    name: row.get(1)?,
                    data: row.get(2)?,
                })
            })
            .optional()?;

        match contact {
            Some(contact) if contact.data.len() > MAX_CONTACT_BLOB => {
                warn!("contact {id} blob exceeds read limit, treating as absent");
                Ok(None)
            }
            other => Ok(other),
        }
    }

    pub async fn delete_contact(&self, id: &ContactId) -> Result<(), StoreError> {
        trace!("deleting contact {id}");
        let db = self.lock().await;
        let mut delete_contact = db.prepare_cached("delete from contacts where id = ?1")?;
        delete_contact.execute([id.as_str()])?;
        let mut delete_emails =
            db.prepare_cached("delete from contact_emails where contact_id = ?1")?;
        delete_emails.execute([id.as_str()])?;
        Ok(())
    }

    pub async fn clear_contacts(&self) -> Result<(), StoreError> {
        trace!("clearing contact cache");
        let db = self.lock().await;
        db.execute_batch("delete from contacts; delete from contact_emails;")?;
        Ok(())
    }

    pub async fn save_contact_email(&self, email: &ContactEmail) -> Result<(), StoreError> {
        trace!("saving contact email {}", email.id);
        let db = self.lock().await;
        let mut stmt = db.prepare_cached(
            "insert or replace into contact_emails (id, contact_id, email) values (?1, ?2, ?3)",
        )?;
        stmt.execute((&email.id, email.contact_id.as_str(), &email.email))?;
        Ok(())
    }

    pub async fn find_contact_email(&self, id: &str) -> Result<Option<ContactEmail>, StoreError> {
        let db = self.lock().await;
        let mut stmt =
            db.prepare_cached("select id, contact_id, email from contact_emails where id = ?1")?;
        Ok(stmt
            .query_one([id], |row| {
                Ok(ContactEmail {
                    id: row.get(0)?,
                    contact_id: ContactId::from(row.get::<_, String>(1)?),
                    email: row.get(2)?,
                })
            })
            .optional()?)
    }

    pub async fn delete_contact_email(&self, id: &str) -> Result<(), StoreError> {
        trace!("deleting contact email {id}");
        let db = self.lock().await;
        let mut stmt = db.prepare_cached("delete from contact_emails where id = ?1")?;
        stmt.execute([id])?;
        Ok(())
    }
}
