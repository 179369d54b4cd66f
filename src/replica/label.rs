use log::trace;
use rusqlite::OptionalExtension;

use crate::{
    feed::{Label, LabelId, LabelKind},
    replica::{Replica, StoreError},
};

impl Replica {
    pub async fn save_label(&self, label: &Label) -> Result<(), StoreError> {
        trace!("saving label {}", label.id);
        let db = self.lock().await;
        let mut stmt = db.prepare_cached(
            "insert or replace into labels (id, name, color, kind, sort_order)
            values (?1, ?2, ?3, ?4, ?5)",
        )?;
        stmt.execute((
            label.id.as_str(),
            &label.name,
            &label.color,
            u8::from(label.kind),
            label.order,
        ))?;
        Ok(())
    }

    pub async fn find_label(&self, id: &LabelId) -> Result<Option<Label>, StoreError> {
        let db = self.lock().await;
        let mut stmt =
            db.prepare_cached("select id, name, color, kind, sort_order from labels where id = ?1")?;
        Ok(stmt
            .query_one([id.as_str()], |row| {
                Ok(Label {
                    id: LabelId::from(row.get::<_, String>(0)?),
                    name: row.get(1)?,
                    color: row.get(2)?,
                    kind: LabelKind::from(row.get::<_, u8>(3)?),
                    order: row.get(4)?,
                })
            })
            .optional()?)
    }

    pub async fn delete_label(&self, id: &LabelId) -> Result<(), StoreError> {
        trace!("deleting label {id}");
        let db = self.lock().await;
        let mut stmt = db.prepare_cached("delete from labels where id = ?1")?;
        stmt.execute([id.as_str()])?;
        Ok(())
    }

    /// Contact groups are label rows; a contact refresh rebuilds them from
    /// the authoritative contact fetch.
    pub async fn delete_contact_groups(&self) -> Result<(), StoreError> {
        trace!("deleting contact group labels");
        let db = self.lock().await;
        let mut stmt = db.prepare_cached("delete from labels where kind = ?1")?;
        stmt.execute([u8::from(LabelKind::ContactGroup)])?;
        Ok(())
    }
}
