use crate::{Post, Ticket, TicketId, UpdatePayload};

/// Highest dateline already reflected in `snapshot`.
///
/// No snapshot and a snapshot without posts both mean "never observed" (0).
pub fn watermark(snapshot: Option<&Ticket>) -> i64 {
    snapshot
        .and_then(|t| t.posts.iter().map(|p| p.dateline).max())
        .unwrap_or(0)
}

/// Posts strictly newer than `watermark`, oldest first.
///
/// The helpdesk does not sort posts, so they are stable-sorted by dateline here and the cut
/// point is found by binary search. Posts sharing the watermark's dateline are excluded.
pub fn select_new_posts(posts: &[Post], watermark: i64) -> Vec<&Post> {
    let mut sorted: Vec<&Post> = posts.iter().collect();
    sorted.sort_by_key(|p| p.dateline);
    let cut = sorted.partition_point(|p| p.dateline <= watermark);
    sorted.split_off(cut)
}

pub fn build_updates(ticket_id: &TicketId, ticket: &Ticket, posts: &[&Post]) -> Vec<UpdatePayload> {
    posts
        .iter()
        .map(|post| UpdatePayload {
            dateline: post.dateline,
            full_name: post.full_name.clone(),
            email: post.email.clone(),
            contents: post.contents.clone(),
            display_id: ticket.display_id.clone(),
            organization: ticket.organization.clone(),
            subject: ticket.subject.clone(),
            ticket_id: ticket_id.clone(),
        })
        .collect()
}

/// Payloads for every post of `current` that `snapshot` has not seen yet.
pub fn diff_ticket(ticket_id: &TicketId, current: &Ticket, snapshot: Option<&Ticket>) -> Vec<UpdatePayload> {
    let mark = watermark(snapshot);
    let fresh = select_new_posts(&current.posts, mark);
    build_updates(ticket_id, current, &fresh)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(dateline: i64, name: &str) -> Post {
        Post {
            dateline,
            full_name: name.to_string(),
            email: format!("{name}@example.com"),
            contents: format!("body {name}"),
        }
    }

    fn ticket(posts: Vec<Post>) -> Ticket {
        Ticket {
            id: TicketId::from_str("277"),
            display_id: "CYA-293-12345".into(),
            organization: "Customer Name".into(),
            subject: "Mayday Mayday".into(),
            posts,
        }
    }

    fn datelines(updates: &[UpdatePayload]) -> Vec<i64> {
        updates.iter().map(|u| u.dateline).collect()
    }

    #[test]
    fn watermark_defaults_to_zero() {
        assert_eq!(watermark(None), 0);
        assert_eq!(watermark(Some(&ticket(vec![]))), 0);
    }

    #[test]
    fn watermark_is_max_dateline() {
        let t = ticket(vec![post(5, "a"), post(9, "b"), post(7, "c")]);
        assert_eq!(watermark(Some(&t)), 9);
    }

    #[test]
    fn cold_start_returns_all_posts_sorted() {
        let t = ticket(vec![post(300, "c"), post(100, "a"), post(200, "b")]);
        let out = diff_ticket(&TicketId::from_str("277"), &t, None);
        assert_eq!(datelines(&out), vec![100, 200, 300]);
    }

    #[test]
    fn no_snapshot_equals_zero_watermark() {
        let posts = vec![post(3, "c"), post(1, "a"), post(2, "b")];
        let a: Vec<i64> = select_new_posts(&posts, 0).iter().map(|p| p.dateline).collect();
        let t = ticket(posts.clone());
        let b = datelines(&diff_ticket(&t.id, &t, None));
        assert_eq!(a, b);
    }

    #[test]
    fn only_posts_after_snapshot_are_new() {
        let snapshot = ticket(vec![post(1552418863, "b"), post(1552317114, "a")]);
        let current = ticket(vec![
            post(1552419863, "c"),
            post(1552418863, "b"),
            post(1552317114, "a"),
        ]);
        let out = diff_ticket(&TicketId::from_str("273"), &current, Some(&snapshot));
        assert_eq!(datelines(&out), vec![1552419863]);
        assert_eq!(out[0].full_name, "c");
        assert_eq!(out[0].ticket_id.as_str(), "273");
        assert_eq!(out[0].display_id, "CYA-293-12345");
    }

    #[test]
    fn ties_at_watermark_are_excluded() {
        let posts = vec![post(10, "seen"), post(10, "same-second"), post(11, "new")];
        let out: Vec<&str> = select_new_posts(&posts, 10).iter().map(|p| p.full_name.as_str()).collect();
        assert_eq!(out, vec!["new"]);
    }

    #[test]
    fn ties_above_watermark_keep_input_order() {
        let posts = vec![post(20, "first"), post(15, "early"), post(20, "second")];
        let out: Vec<&str> = select_new_posts(&posts, 0).iter().map(|p| p.full_name.as_str()).collect();
        assert_eq!(out, vec!["early", "first", "second"]);
    }

    #[test]
    fn selection_matches_filter_for_any_watermark() {
        let posts = vec![post(4, "d"), post(1, "a"), post(3, "c"), post(2, "b"), post(3, "c2")];
        for w in 0..6 {
            let got: Vec<i64> = select_new_posts(&posts, w).iter().map(|p| p.dateline).collect();
            let mut want: Vec<i64> = posts.iter().map(|p| p.dateline).filter(|d| *d > w).collect();
            want.sort();
            assert_eq!(got, want, "watermark {w}");
        }
    }

    #[test]
    fn unchanged_ticket_yields_nothing() {
        let t = ticket(vec![post(2, "b"), post(1, "a")]);
        assert!(diff_ticket(&t.id, &t, Some(&t)).is_empty());
    }
}
