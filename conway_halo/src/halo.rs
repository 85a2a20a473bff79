// halo.rs - Boundary row exchange between ring neighbours
//
// Every generation each worker hands its top interior row to the previous
// worker and its bottom interior row to the next one, and takes theirs as its
// new halos. All links are rendezvous channels, so the order of operations is
// what keeps the ring from deadlocking:
//
//   even ring index: send, then receive
//   odd ring index:  receive, then send
//
// applied once per direction (downward, then upward). Each direction is a
// cyclic shift in which worker 1 always receives first, so the chain of
// waits is broken for every ring size >= 2, odd sizes included. A ring of one
// worker never touches a channel: its halos are its own opposite edges.

use crate::channel::{RendezvousReceiver, RendezvousSender, rendezvous};
use crate::error::ProtocolError;
use crate::grid::Row;

/// A boundary row tagged with the generation it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HaloRow {
    pub generation: u64,
    pub cells: Row,
}

struct Peers {
    to_prev: RendezvousSender<HaloRow>,
    from_prev: RendezvousReceiver<HaloRow>,
    to_next: RendezvousSender<HaloRow>,
    from_next: RendezvousReceiver<HaloRow>,
}

/// One worker's four links into the ring.
pub struct HaloLinks {
    index: usize,
    peers: Option<Peers>,
}

/// Wires up `workers` ring positions. Position `i` goes to worker `i`.
///
/// `down[i]` carries worker i's bottom row to worker i+1, `up[i]` carries
/// worker i+1's top row back to worker i.
pub fn ring(workers: usize) -> Vec<HaloLinks> {
    if workers <= 1 {
        return (0..workers)
            .map(|index| HaloLinks { index, peers: None })
            .collect();
    }

    let (down_tx, mut down_rx): (Vec<_>, Vec<_>) = (0..workers).map(|_| rendezvous()).unzip();
    let (mut up_tx, up_rx): (Vec<_>, Vec<_>) = (0..workers).map(|_| rendezvous()).unzip();
    // Worker i reads down[i-1] and writes up[i-1].
    down_rx.rotate_right(1);
    up_tx.rotate_right(1);

    down_tx
        .into_iter()
        .zip(down_rx)
        .zip(up_tx.into_iter().zip(up_rx))
        .enumerate()
        .map(|(index, ((to_next, from_prev), (to_prev, from_next)))| HaloLinks {
            index,
            peers: Some(Peers {
                to_prev,
                from_prev,
                to_next,
                from_next,
            }),
        })
        .collect()
}

impl HaloLinks {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_even(&self) -> bool {
        self.index % 2 == 0
    }

    /// Publishes `top` and `bottom` (this worker's interior edge rows after
    /// `generation`) and returns the new `(top_halo, bottom_halo)`.
    pub async fn exchange(
        &mut self,
        generation: u64,
        top: &Row,
        bottom: &Row,
    ) -> Result<(Row, Row), ProtocolError> {
        let worker = self.index;
        let even = self.is_even();
        let Some(peers) = self.peers.as_mut() else {
            return Ok((bottom.clone(), top.clone()));
        };

        let expect = Expect {
            worker,
            generation,
            width: top.len(),
        };

        let down = HaloRow {
            generation,
            cells: bottom.clone(),
        };
        let top_halo = if even {
            send(&peers.to_next, down, worker).await?;
            recv(&mut peers.from_prev, expect).await?
        } else {
            let halo = recv(&mut peers.from_prev, expect).await?;
            send(&peers.to_next, down, worker).await?;
            halo
        };

        let up = HaloRow {
            generation,
            cells: top.clone(),
        };
        let bottom_halo = if even {
            send(&peers.to_prev, up, worker).await?;
            recv(&mut peers.from_next, expect).await?
        } else {
            let halo = recv(&mut peers.from_next, expect).await?;
            send(&peers.to_prev, up, worker).await?;
            halo
        };

        Ok((top_halo, bottom_halo))
    }
}

/// What a received halo must look like.
#[derive(Clone, Copy)]
struct Expect {
    worker: usize,
    generation: u64,
    width: usize,
}

async fn send(link: &RendezvousSender<HaloRow>, row: HaloRow, worker: usize) -> Result<(), ProtocolError> {
    link.send(row).await.map_err(|_| ProtocolError::PeerGone { worker })
}

async fn recv(link: &mut RendezvousReceiver<HaloRow>, expect: Expect) -> Result<Row, ProtocolError> {
    let Expect {
        worker,
        generation,
        width,
    } = expect;
    let halo = link.recv().await.ok_or(ProtocolError::PeerGone { worker })?;
    if halo.generation != generation {
        return Err(ProtocolError::StaleHalo {
            worker,
            expected: generation,
            actual: halo.generation,
        });
    }
    if halo.cells.len() != width {
        return Err(ProtocolError::RowWidth {
            worker,
            expected: width,
            actual: halo.cells.len(),
        });
    }
    Ok(halo.cells)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    /// Distinct, recognisable edge rows for worker `i`.
    fn edges(i: usize, width: usize) -> (Row, Row) {
        let top = (0..width).map(|x| (x + i) % 3 == 0).collect();
        let bottom = (0..width).map(|x| (x * 7 + i) % 5 < 2).collect();
        (top, bottom)
    }

    async fn full_round(workers: usize, width: usize) -> Vec<(Row, Row)> {
        let handles: Vec<_> = ring(workers)
            .into_iter()
            .enumerate()
            .map(|(i, mut links)| {
                tokio::spawn(async move {
                    let (top, bottom) = edges(i, width);
                    links.exchange(1, &top, &bottom).await
                })
            })
            .collect();

        let mut halos = Vec::new();
        for handle in handles {
            halos.push(handle.await.unwrap().unwrap());
        }
        halos
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn one_round_completes_for_odd_even_and_single_rings() {
        for workers in [1, 2, 3, 4, 5, 7, 8, 13, 16] {
            let halos = timeout(Duration::from_secs(5), full_round(workers, 9))
                .await
                .unwrap_or_else(|_| panic!("exchange stalled with {workers} workers"));

            for (i, (top_halo, bottom_halo)) in halos.iter().enumerate() {
                let prev = (i + workers - 1) % workers;
                let next = (i + 1) % workers;
                assert_eq!(top_halo, &edges(prev, 9).1, "top halo of {i}/{workers}");
                assert_eq!(bottom_halo, &edges(next, 9).0, "bottom halo of {i}/{workers}");
            }
        }
    }

    #[tokio::test]
    async fn single_worker_swaps_its_own_edges() {
        let mut links = ring(1).pop().unwrap();
        let (top, bottom) = edges(0, 6);
        let (top_halo, bottom_halo) = links.exchange(4, &top, &bottom).await.unwrap();
        assert_eq!(top_halo, bottom);
        assert_eq!(bottom_halo, top);
    }

    #[tokio::test]
    async fn send_first_everywhere_stalls() {
        // Same channels, but every worker sends before it receives.
        let handles: Vec<_> = ring(3)
            .into_iter()
            .map(|mut links| {
                tokio::spawn(async move {
                    let peers = links.peers.as_mut().unwrap();
                    let row = HaloRow {
                        generation: 1,
                        cells: vec![true; 4],
                    };
                    peers.to_next.send(row.clone()).await.unwrap();
                    peers.to_prev.send(row).await.unwrap();
                    peers.from_prev.recv().await;
                    peers.from_next.recv().await;
                })
            })
            .collect();

        let all = async {
            for handle in handles {
                handle.await.unwrap();
            }
        };
        assert!(timeout(Duration::from_millis(200), all).await.is_err());
    }

    #[tokio::test]
    async fn halo_from_another_generation_is_rejected() {
        let mut links = ring(2).into_iter();
        let (mut even, mut odd) = (links.next().unwrap(), links.next().unwrap());
        let row = vec![false; 3];

        let (even_result, odd_result) = tokio::join!(
            even.exchange(1, &row, &row),
            async {
                let result = odd.exchange(2, &row, &row).await;
                drop(odd);
                result
            }
        );

        assert_eq!(
            odd_result,
            Err(ProtocolError::StaleHalo {
                worker: 1,
                expected: 2,
                actual: 1
            })
        );
        assert_eq!(even_result, Err(ProtocolError::PeerGone { worker: 0 }));
    }
}
