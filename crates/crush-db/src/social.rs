//! Social graph engine.
//!
//! A friendship is two directed rows in `friendships` that are written and
//! removed together inside one transaction. Friend requests are directional
//! and move pending -> accepted | rejected; a request crossing a pending one
//! from the other side is treated as an acceptance of the existing request.

use std::collections::HashSet;

use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, error, info, warn};

use crush_types::models::{RequestDirection, RequestStatus};

use crate::error::is_missing_table;
use crate::models::{FriendRequestRow, FriendshipRow, Relation, RepairReport, UserRow};
use crate::users::{USER_COLUMNS, map_user, query_users_by_ids, user_exists};
use crate::{Database, Error, Result, new_id, timestamp};

const REQUEST_COLUMNS: &str = "id, sender_id, receiver_id, status, created_at, updated_at";

/// Result of `send_request`.
#[derive(Debug, Clone)]
pub enum SendOutcome {
    /// A new pending request, or a stale one revived to pending.
    Pending(FriendRequestRow),
    /// The receiver had already asked; their request was accepted and the
    /// friendship now exists.
    Accepted(FriendRequestRow),
}

impl SendOutcome {
    pub fn request(&self) -> &FriendRequestRow {
        match self {
            Self::Pending(req) | Self::Accepted(req) => req,
        }
    }
}

fn map_request(row: &Row<'_>) -> rusqlite::Result<FriendRequestRow> {
    Ok(FriendRequestRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        status: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

impl Database {
    // -- Friend requests --

    pub fn send_request(&self, sender_id: &str, receiver_id: &str) -> Result<SendOutcome> {
        let outcome = self.with_conn_mut(|conn| {
            if sender_id == receiver_id {
                return Err(Error::Conflict("cannot send a friend request to yourself".into()));
            }
            if !user_exists(conn, sender_id)? || !user_exists(conn, receiver_id)? {
                return Err(Error::NotFound("user"));
            }

            let tx = conn.unchecked_transaction()?;

            if friendship_exists(&tx, sender_id, receiver_id)? {
                return Err(Error::Conflict("already friends with this user".into()));
            }

            let existing = query_request_between(&tx, sender_id, receiver_id)?;
            if let Some(ref req) = existing {
                if req.status == RequestStatus::Pending.as_str() {
                    return Err(Error::Conflict("friend request already sent".into()));
                }
            }

            // Crossing request: the row that already exists wins and this
            // send becomes its acceptance.
            if let Some(reverse) = query_request_between(&tx, receiver_id, sender_id)? {
                if reverse.status == RequestStatus::Pending.as_str() {
                    set_request_status(&tx, &reverse.id, RequestStatus::Accepted)?;
                    insert_friendship_pair(&tx, sender_id, receiver_id)?;
                    let accepted = query_request(&tx, &reverse.id)?.ok_or(Error::NotFound("friend request"))?;
                    tx.commit()?;

                    info!(
                        "Crossing friend request from {} accepted request {}: {} <-> {}",
                        sender_id, accepted.id, sender_id, receiver_id
                    );
                    return Ok(SendOutcome::Accepted(accepted));
                }
            }

            let request_id = match existing {
                Some(stale) => {
                    set_request_status(&tx, &stale.id, RequestStatus::Pending)?;
                    stale.id
                }
                None => {
                    let id = new_id();
                    let now = timestamp();
                    tx.execute(
                        "INSERT INTO friendship_requests (id, sender_id, receiver_id, status, created_at, updated_at)
                         VALUES (?1, ?2, ?3, 'pending', ?4, ?4)",
                        params![id, sender_id, receiver_id, now],
                    )?;
                    id
                }
            };

            let request = query_request(&tx, &request_id)?.ok_or(Error::NotFound("friend request"))?;
            tx.commit()?;

            info!("Friend request {} sent: {} -> {}", request.id, sender_id, receiver_id);
            Ok(SendOutcome::Pending(request))
        })?;

        match &outcome {
            SendOutcome::Pending(req) => self.notify_friend_request(sender_id, receiver_id, &req.id),
            SendOutcome::Accepted(_) => self.notify_friend_accepted(sender_id, receiver_id),
        }
        Ok(outcome)
    }

    /// Receiver-only transition out of `pending`. Accepting writes both
    /// friendship rows in the same transaction as the status change.
    pub fn respond_to_request(
        &self,
        request_id: &str,
        actor_id: &str,
        decision: RequestStatus,
    ) -> Result<FriendRequestRow> {
        if decision == RequestStatus::Pending {
            return Err(Error::Validation("status must be one of: accepted, rejected".into()));
        }

        let request = self.with_conn_mut(|conn| {
            let request = query_request(conn, request_id)?.ok_or(Error::NotFound("friend request"))?;
            if request.receiver_id != actor_id {
                return Err(Error::Forbidden("only the receiver can respond to this request".into()));
            }
            if request.status != RequestStatus::Pending.as_str() {
                return Err(Error::Validation(format!("friend request already {}", request.status)));
            }

            let tx = conn.unchecked_transaction()?;
            set_request_status(&tx, request_id, decision)?;
            if decision == RequestStatus::Accepted {
                insert_friendship_pair(&tx, &request.sender_id, &request.receiver_id)?;
            }
            let updated = query_request(&tx, request_id)?.ok_or(Error::NotFound("friend request"))?;
            tx.commit()?;

            info!(
                "Friend request {} {}: {} -> {}",
                request_id, decision, request.sender_id, request.receiver_id
            );
            Ok(updated)
        })?;

        if decision == RequestStatus::Accepted {
            self.notify_friend_accepted(actor_id, &request.sender_id);
        }
        Ok(request)
    }

    /// Sender-only withdrawal of a pending request.
    pub fn cancel_request(&self, request_id: &str, actor_id: &str) -> Result<FriendRequestRow> {
        self.with_conn_mut(|conn| {
            let request = query_request(conn, request_id)?.ok_or(Error::NotFound("friend request"))?;
            if request.sender_id != actor_id {
                return Err(Error::Forbidden("only the sender can cancel this request".into()));
            }
            if request.status != RequestStatus::Pending.as_str() {
                return Err(Error::Validation(format!("friend request already {}", request.status)));
            }

            conn.execute("DELETE FROM friendship_requests WHERE id = ?1", [request_id])?;
            info!("Friend request {} cancelled by {}", request_id, actor_id);
            Ok(request)
        })
    }

    pub fn get_request(&self, request_id: &str) -> Result<Option<FriendRequestRow>> {
        self.with_conn(|conn| query_request(conn, request_id))
    }

    pub fn list_requests(
        &self,
        user_id: &str,
        direction: RequestDirection,
        status: Option<RequestStatus>,
    ) -> Result<Vec<FriendRequestRow>> {
        let column = match direction {
            RequestDirection::Received => "receiver_id",
            RequestDirection::Sent => "sender_id",
        };

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {REQUEST_COLUMNS} FROM friendship_requests
                 WHERE {column} = ?1 AND (?2 IS NULL OR status = ?2)
                 ORDER BY created_at DESC, rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![user_id, status.map(|s| s.as_str())], map_request)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Friendships --

    pub fn are_friends(&self, user_id: &str, other_id: &str) -> Result<bool> {
        self.with_conn(|conn| friendship_exists(conn, user_id, other_id))
    }

    pub fn friend_ids(&self, user_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| query_friend_ids(conn, user_id))
    }

    pub fn friends(&self, user_id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let ids = query_friend_ids(conn, user_id)?;
            let users = query_users_by_ids(conn, &ids)?;
            if users.len() != ids.len() {
                warn!(
                    "{} friendship rows for {} point at missing users",
                    ids.len() - users.len(),
                    user_id
                );
            }
            Ok(users)
        })
    }

    /// Removes both directed rows and every request between the pair.
    /// Nothing changes when the two are not friends.
    pub fn remove_friendship(&self, user_id: &str, friend_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;

            let edges = tx.execute(
                "DELETE FROM friendships
                 WHERE (user_id = ?1 AND friend_id = ?2) OR (user_id = ?2 AND friend_id = ?1)",
                params![user_id, friend_id],
            )?;
            if edges == 0 {
                return Err(Error::NotFound("friendship"));
            }

            let requests = tx.execute(
                "DELETE FROM friendship_requests
                 WHERE (sender_id = ?1 AND receiver_id = ?2) OR (sender_id = ?2 AND receiver_id = ?1)",
                params![user_id, friend_id],
            )?;
            tx.commit()?;

            info!(
                "Friendship removed: {} <-> {} ({} edges, {} requests)",
                user_id, friend_id, edges, requests
            );
            Ok(())
        })
    }

    pub fn friendship_status(&self, viewer_id: &str, other_id: &str) -> Result<Relation> {
        if viewer_id == other_id {
            return Ok(Relation::Myself);
        }

        self.with_conn(|conn| {
            if !user_exists(conn, other_id)? {
                return Err(Error::NotFound("user"));
            }
            if friendship_exists(conn, viewer_id, other_id)? {
                return Ok(Relation::Friends);
            }

            if let Some(sent) = query_request_between(conn, viewer_id, other_id)? {
                if sent.status == RequestStatus::Pending.as_str() {
                    return Ok(Relation::RequestSent(sent.id));
                }
            }
            if let Some(received) = query_request_between(conn, other_id, viewer_id)? {
                if received.status == RequestStatus::Pending.as_str() {
                    return Ok(Relation::RequestReceived(received.id));
                }
            }

            Ok(Relation::None)
        })
    }

    /// Inserts the missing mirror row for every one-way friendship.
    /// Per-pair failures are logged and skipped; running it again is a no-op.
    pub fn repair_asymmetry(&self) -> Result<RepairReport> {
        self.with_conn_mut(|conn| {
            let rows = match query_all_friendships(conn) {
                Ok(rows) => rows,
                Err(Error::Sqlite(e)) if is_missing_table(&e) => {
                    debug!("friendships table missing, nothing to repair");
                    return Ok(RepairReport::default());
                }
                Err(e) => return Err(e),
            };

            let pairs: HashSet<(&str, &str)> = rows
                .iter()
                .map(|r| (r.user_id.as_str(), r.friend_id.as_str()))
                .collect();

            let mut report = RepairReport {
                scanned: rows.len(),
                ..Default::default()
            };

            for row in &rows {
                if pairs.contains(&(row.friend_id.as_str(), row.user_id.as_str())) {
                    continue;
                }

                warn!("Creating missing friendship record: {} -> {}", row.friend_id, row.user_id);
                match conn.execute(
                    "INSERT OR IGNORE INTO friendships (user_id, friend_id, created_at) VALUES (?1, ?2, ?3)",
                    params![row.friend_id, row.user_id, row.created_at],
                ) {
                    Ok(n) => report.repaired += n,
                    Err(e) => {
                        error!(
                            "Failed to create reverse friendship {} -> {}: {}",
                            row.friend_id, row.user_id, e
                        );
                        report.failed += 1;
                    }
                }
            }

            if report.repaired > 0 || report.failed > 0 {
                warn!(
                    "Friendship repair: {} scanned, {} repaired, {} failed",
                    report.scanned, report.repaired, report.failed
                );
            }
            Ok(report)
        })
    }

    /// "People you may know": verified, active users with no friendship or
    /// pending request involving the caller.
    pub fn suggested_users(&self, user_id: &str, offset: u32, limit: u32) -> Result<Vec<UserRow>> {
        if let Err(e) = self.repair_asymmetry() {
            warn!("Friendship repair before suggestions failed: {}", e);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users u
                 WHERE u.id != ?1 AND u.is_verified = 1 AND u.is_active = 1
                   AND u.id NOT IN (SELECT friend_id FROM friendships WHERE user_id = ?1)
                   AND u.id NOT IN (SELECT user_id FROM friendships WHERE friend_id = ?1)
                   AND u.id NOT IN (SELECT receiver_id FROM friendship_requests
                                    WHERE sender_id = ?1 AND status = 'pending')
                   AND u.id NOT IN (SELECT sender_id FROM friendship_requests
                                    WHERE receiver_id = ?1 AND status = 'pending')
                 ORDER BY u.created_at DESC, u.rowid DESC
                 LIMIT ?2 OFFSET ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![user_id, limit, offset], |row| map_user(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

/// The single authoritative friend query: both edge directions, deduplicated,
/// self excluded. A missing friendships table reads as no friends.
fn query_friend_ids(conn: &Connection, user_id: &str) -> Result<Vec<String>> {
    let result = (|| -> rusqlite::Result<Vec<String>> {
        let mut stmt = conn.prepare(
            "SELECT friend_id FROM friendships WHERE user_id = ?1 AND friend_id != ?1
             UNION
             SELECT user_id FROM friendships WHERE friend_id = ?1 AND user_id != ?1",
        )?;
        let ids = stmt
            .query_map([user_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(ids)
    })();

    match result {
        Ok(ids) => Ok(ids),
        Err(e) if is_missing_table(&e) => {
            debug!("friendships table missing, treating {} as friendless", user_id);
            Ok(vec![])
        }
        Err(e) => Err(e.into()),
    }
}

fn friendship_exists(conn: &Connection, user_id: &str, other_id: &str) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM friendships
                       WHERE (user_id = ?1 AND friend_id = ?2) OR (user_id = ?2 AND friend_id = ?1))",
        params![user_id, other_id],
        |row| row.get(0),
    )?)
}

fn insert_friendship_pair(conn: &Connection, user_id: &str, friend_id: &str) -> Result<()> {
    let now = timestamp();
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO friendships (user_id, friend_id, created_at) VALUES (?1, ?2, ?3)",
    )?;
    stmt.execute(params![user_id, friend_id, now])?;
    stmt.execute(params![friend_id, user_id, now])?;
    Ok(())
}

fn set_request_status(conn: &Connection, request_id: &str, status: RequestStatus) -> Result<()> {
    conn.execute(
        "UPDATE friendship_requests SET status = ?2, updated_at = ?3 WHERE id = ?1",
        params![request_id, status.as_str(), timestamp()],
    )?;
    Ok(())
}

fn query_request(conn: &Connection, request_id: &str) -> Result<Option<FriendRequestRow>> {
    let sql = format!("SELECT {REQUEST_COLUMNS} FROM friendship_requests WHERE id = ?1");
    Ok(conn.query_row(&sql, [request_id], map_request).optional()?)
}

fn query_request_between(
    conn: &Connection,
    sender_id: &str,
    receiver_id: &str,
) -> Result<Option<FriendRequestRow>> {
    let sql = format!(
        "SELECT {REQUEST_COLUMNS} FROM friendship_requests WHERE sender_id = ?1 AND receiver_id = ?2"
    );
    Ok(conn
        .query_row(&sql, params![sender_id, receiver_id], map_request)
        .optional()?)
}

fn query_all_friendships(conn: &Connection) -> Result<Vec<FriendshipRow>> {
    let mut stmt = conn.prepare("SELECT user_id, friend_id, created_at FROM friendships ORDER BY user_id, friend_id")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(FriendshipRow {
                user_id: row.get(0)?,
                friend_id: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::users::tests::add_user;

    fn edge_count(db: &Database, a: &str, b: &str) -> i64 {
        db.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM friendships
                 WHERE (user_id = ?1 AND friend_id = ?2) OR (user_id = ?2 AND friend_id = ?1)",
                params![a, b],
                |r| r.get(0),
            )?)
        })
        .unwrap()
    }

    fn requests_between(db: &Database, a: &str, b: &str) -> Vec<FriendRequestRow> {
        db.with_conn(|conn| {
            let sql = format!(
                "SELECT {REQUEST_COLUMNS} FROM friendship_requests
                 WHERE (sender_id = ?1 AND receiver_id = ?2) OR (sender_id = ?2 AND receiver_id = ?1)"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![a, b], map_request)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .unwrap()
    }

    /// Makes `a` and `b` friends through the request flow.
    pub(crate) fn befriend(db: &Database, a: &str, b: &str) {
        let outcome = db.send_request(a, b).unwrap();
        db.respond_to_request(&outcome.request().id, b, RequestStatus::Accepted)
            .unwrap();
    }

    #[test]
    fn test_accept_creates_both_edges() {
        let db = Database::open_in_memory().unwrap();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");

        let outcome = db.send_request(&alice, &bob).unwrap();
        assert!(matches!(outcome, SendOutcome::Pending(_)));
        assert_eq!(edge_count(&db, &alice, &bob), 0);

        let accepted = db
            .respond_to_request(&outcome.request().id, &bob, RequestStatus::Accepted)
            .unwrap();
        assert_eq!(accepted.status, "accepted");
        assert_eq!(edge_count(&db, &alice, &bob), 2);
        assert!(db.are_friends(&alice, &bob).unwrap());
        assert!(db.are_friends(&bob, &alice).unwrap());

        let requests = requests_between(&db, &alice, &bob);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].status, "accepted");
    }

    #[test]
    fn test_reject_leaves_no_friendship() {
        let db = Database::open_in_memory().unwrap();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");

        let outcome = db.send_request(&alice, &bob).unwrap();
        let rejected = db
            .respond_to_request(&outcome.request().id, &bob, RequestStatus::Rejected)
            .unwrap();
        assert_eq!(rejected.status, "rejected");
        assert_eq!(edge_count(&db, &alice, &bob), 0);

        // Already decided
        let err = db
            .respond_to_request(&outcome.request().id, &bob, RequestStatus::Accepted)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        // A rejected request can be re-sent; the same row goes back to pending.
        let resent = db.send_request(&alice, &bob).unwrap();
        assert!(matches!(resent, SendOutcome::Pending(_)));
        assert_eq!(resent.request().id, outcome.request().id);
        assert_eq!(resent.request().status, "pending");
    }

    #[test]
    fn test_respond_permissions() {
        let db = Database::open_in_memory().unwrap();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");

        let outcome = db.send_request(&alice, &bob).unwrap();
        let id = &outcome.request().id;

        let err = db.respond_to_request(id, &alice, RequestStatus::Accepted).unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));

        let err = db.respond_to_request(id, &bob, RequestStatus::Pending).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = db.respond_to_request("missing", &bob, RequestStatus::Accepted).unwrap_err();
        assert!(matches!(err, Error::NotFound("friend request")));
    }

    #[test]
    fn test_send_request_conflicts() {
        let db = Database::open_in_memory().unwrap();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");
        let carol = add_user(&db, "carol");

        let err = db.send_request(&alice, &alice).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        let err = db.send_request(&alice, "ghost").unwrap_err();
        assert!(matches!(err, Error::NotFound("user")));

        db.send_request(&alice, &bob).unwrap();
        let err = db.send_request(&alice, &bob).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        befriend(&db, &alice, &carol);
        let err = db.send_request(&carol, &alice).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn test_crossing_requests_become_friendship() {
        let db = Database::open_in_memory().unwrap();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");

        let first = db.send_request(&bob, &alice).unwrap();
        let second = db.send_request(&alice, &bob).unwrap();

        match second {
            SendOutcome::Accepted(req) => {
                assert_eq!(req.id, first.request().id);
                assert_eq!(req.sender_id, bob);
                assert_eq!(req.status, "accepted");
            }
            SendOutcome::Pending(_) => panic!("crossing request should be accepted"),
        }

        assert_eq!(edge_count(&db, &alice, &bob), 2);
        let pending: Vec<_> = requests_between(&db, &alice, &bob)
            .into_iter()
            .filter(|r| r.status == "pending")
            .collect();
        assert!(pending.is_empty());
        assert_eq!(requests_between(&db, &alice, &bob).len(), 1);
    }

    #[test]
    fn test_remove_friendship() {
        let db = Database::open_in_memory().unwrap();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");

        befriend(&db, &alice, &bob);
        db.remove_friendship(&bob, &alice).unwrap();

        assert!(!db.are_friends(&alice, &bob).unwrap());
        assert_eq!(edge_count(&db, &alice, &bob), 0);
        assert!(requests_between(&db, &alice, &bob).is_empty());

        let err = db.remove_friendship(&alice, &bob).unwrap_err();
        assert!(matches!(err, Error::NotFound("friendship")));
    }

    #[test]
    fn test_failed_remove_keeps_pending_request() {
        let db = Database::open_in_memory().unwrap();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");

        db.send_request(&alice, &bob).unwrap();
        assert!(db.remove_friendship(&alice, &bob).is_err());
        assert_eq!(requests_between(&db, &alice, &bob).len(), 1);
    }

    #[test]
    fn test_cancel_request() {
        let db = Database::open_in_memory().unwrap();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");

        let outcome = db.send_request(&alice, &bob).unwrap();
        let id = outcome.request().id.clone();

        let err = db.cancel_request(&id, &bob).unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));

        db.cancel_request(&id, &alice).unwrap();
        assert!(db.get_request(&id).unwrap().is_none());
    }

    #[test]
    fn test_list_requests_and_status() {
        let db = Database::open_in_memory().unwrap();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");
        let carol = add_user(&db, "carol");

        let to_bob = db.send_request(&alice, &bob).unwrap();
        db.send_request(&carol, &alice).unwrap();

        let sent = db.list_requests(&alice, RequestDirection::Sent, None).unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].receiver_id, bob);

        let received = db
            .list_requests(&alice, RequestDirection::Received, Some(RequestStatus::Pending))
            .unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].sender_id, carol);

        let none = db
            .list_requests(&alice, RequestDirection::Received, Some(RequestStatus::Accepted))
            .unwrap();
        assert!(none.is_empty());

        assert_eq!(db.friendship_status(&alice, &alice).unwrap(), Relation::Myself);
        assert_eq!(
            db.friendship_status(&alice, &bob).unwrap(),
            Relation::RequestSent(to_bob.request().id.clone())
        );
        assert!(matches!(
            db.friendship_status(&alice, &carol).unwrap(),
            Relation::RequestReceived(_)
        ));

        befriend(&db, &bob, &carol);
        assert_eq!(db.friendship_status(&carol, &bob).unwrap(), Relation::Friends);
        assert_eq!(db.friendship_status(&bob, &alice).unwrap(), Relation::RequestReceived(to_bob.request().id.clone()));
    }

    #[test]
    fn test_status_for_unknown_user() {
        let db = Database::open_in_memory().unwrap();
        let alice = add_user(&db, "alice");

        assert!(matches!(
            db.friendship_status(&alice, "nobody-at-all"),
            Err(Error::NotFound("user"))
        ));
    }

    #[test]
    fn test_friend_ids_are_deduplicated() {
        let db = Database::open_in_memory().unwrap();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");
        let carol = add_user(&db, "carol");

        befriend(&db, &alice, &bob);
        befriend(&db, &carol, &alice);

        let mut ids = db.friend_ids(&alice).unwrap();
        ids.sort();
        let mut expected = vec![bob.clone(), carol.clone()];
        expected.sort();
        assert_eq!(ids, expected);

        let names: Vec<String> = db.friends(&alice).unwrap().into_iter().map(|u| u.username).collect();
        assert_eq!(names, ["bob", "carol"]);
    }

    #[test]
    fn test_missing_friendship_table_reads_as_empty() {
        let db = Database::open_in_memory().unwrap();
        let alice = add_user(&db, "alice");
        db.with_conn_mut(|conn| {
            conn.execute_batch("DROP TABLE friendships;")?;
            Ok(())
        })
        .unwrap();

        assert!(db.friend_ids(&alice).unwrap().is_empty());
        assert_eq!(db.repair_asymmetry().unwrap(), RepairReport::default());
    }

    #[test]
    fn test_repair_asymmetry_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");
        let carol = add_user(&db, "carol");

        befriend(&db, &alice, &carol);
        // Simulate a historical one-way row.
        db.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO friendships (user_id, friend_id, created_at) VALUES (?1, ?2, ?3)",
                params![alice, bob, timestamp()],
            )?;
            Ok(())
        })
        .unwrap();
        assert_eq!(edge_count(&db, &alice, &bob), 1);

        let first = db.repair_asymmetry().unwrap();
        assert_eq!(first, RepairReport { scanned: 3, repaired: 1, failed: 0 });
        assert_eq!(edge_count(&db, &alice, &bob), 2);

        let snapshot = db.with_conn(query_all_friendships).unwrap();
        let second = db.repair_asymmetry().unwrap();
        assert_eq!(second, RepairReport { scanned: 4, repaired: 0, failed: 0 });
        assert_eq!(db.with_conn(query_all_friendships).unwrap(), snapshot);
    }

    #[test]
    fn test_repair_skips_failed_pair() {
        let db = Database::open_in_memory().unwrap();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");
        let carol = add_user(&db, "carol");

        // One row points at a user that was never created; its mirror
        // cannot be written once foreign keys are enforced again.
        db.with_conn_mut(|conn| {
            conn.pragma_update(None, "foreign_keys", "OFF")?;
            conn.execute(
                "INSERT INTO friendships (user_id, friend_id, created_at) VALUES (?1, 'ghost', ?2)",
                params![alice, timestamp()],
            )?;
            conn.execute(
                "INSERT INTO friendships (user_id, friend_id, created_at) VALUES (?1, ?2, ?3)",
                params![bob, carol, timestamp()],
            )?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            Ok(())
        })
        .unwrap();

        let report = db.repair_asymmetry().unwrap();
        assert_eq!(report, RepairReport { scanned: 2, repaired: 1, failed: 1 });
        assert_eq!(edge_count(&db, &bob, &carol), 2);
        assert!(db.are_friends(&carol, &bob).unwrap());

        let snapshot = db.with_conn(query_all_friendships).unwrap();
        let again = db.repair_asymmetry().unwrap();
        assert_eq!(again, RepairReport { scanned: 3, repaired: 0, failed: 1 });
        assert_eq!(db.with_conn(query_all_friendships).unwrap(), snapshot);
    }

    #[test]
    fn test_suggested_users() {
        let db = Database::open_in_memory().unwrap();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");
        let carol = add_user(&db, "carol");
        add_user(&db, "dave");
        let erin = add_user(&db, "erin");
        db.set_user_verified(&erin, false).unwrap();

        befriend(&db, &alice, &bob);
        db.send_request(&carol, &alice).unwrap();

        let names: Vec<String> = db
            .suggested_users(&alice, 0, 10)
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(names, ["dave"]);
    }
}
